#![allow(non_snake_case)]

pub mod AccessBlacklist;
pub mod AccessHistory;
pub mod AccessWhitelist;
pub mod ActiveSession;
pub mod FailedAttempt;
pub mod GeoCache;
pub mod Setting;
pub mod SubscriptionAccess;
