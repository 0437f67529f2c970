pub mod access_control;
pub mod access_lists;
pub mod consts;
pub mod db;
mod device;
pub mod failed_attempts;
pub mod geo;
mod matcher;
pub mod notifications;
mod services;
pub mod sessions;
pub mod settings;
pub mod subscriptions;
#[cfg(test)]
mod test_support;

pub use access_control::{AccessControlService, IpStats, MaintenanceStats};
pub use access_lists::{AccessListStore, ImportReport, ListScope, NewListEntry};
pub use device::classify_user_agent;
pub use geo::{GeoDatabase, GeoInfo, GeoReaderSlot, GeolocationCache};
pub use matcher::*;
pub use notifications::{AccessEvent, AccessEventKind, ChannelNotifier, LogNotifier, Notifier};
pub use services::Services;
pub use sessions::{HistoryFilter, HistoryPage, OnlineSession};
