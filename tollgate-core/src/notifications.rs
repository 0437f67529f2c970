use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tollgate_db_entities::ActiveSession::{self, DeviceType};
use tracing::{info, warn};
use uuid::Uuid;

use crate::geo::GeoInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessEventKind {
    NewDevice,
    IpLimitReached,
    SuspiciousActivity,
    DeviceKicked,
    AutoBlacklisted,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccessEvent {
    pub kind: AccessEventKind,
    /// Absent for events that are not tied to an account (auto-blacklisting)
    pub account_id: Option<Uuid>,
    pub ip: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub device_type: Option<DeviceType>,
    pub user_agent: Option<String>,
    pub reason: Option<String>,
    /// Event-specific count: active sessions, distinct countries, failed attempts
    pub count: Option<u64>,
    pub limit: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl AccessEvent {
    pub fn new(kind: AccessEventKind, account_id: Option<Uuid>, ip: &str) -> Self {
        Self {
            kind,
            account_id,
            ip: ip.to_owned(),
            country: None,
            city: None,
            device_type: None,
            user_agent: None,
            reason: None,
            count: None,
            limit: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_geo(mut self, geo: &GeoInfo) -> Self {
        self.country = geo.country_code.clone();
        self.city = geo.city.clone();
        self
    }

    #[must_use]
    pub fn with_device(mut self, device_type: DeviceType, user_agent: &str) -> Self {
        self.device_type = Some(device_type);
        self.user_agent = Some(user_agent.to_owned());
        self
    }

    /// Location and device as recorded on the session
    #[must_use]
    pub fn with_session(mut self, session: &ActiveSession::Model) -> Self {
        self.country = session.country.clone();
        self.city = session.city.clone();
        self.device_type = Some(session.device_type);
        self.user_agent = Some(session.user_agent.clone());
        self
    }

    #[must_use]
    pub fn with_reason<R: Into<String>>(mut self, reason: R) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: u64, limit: Option<u64>) -> Self {
        self.count = Some(count);
        self.limit = limit;
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("notification channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Delivery of access events to users or operators.
///
/// Called inline on the request path, so implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AccessEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &AccessEvent) -> Result<(), NotifyError> {
        info!(
            kind = ?event.kind,
            account_id = ?event.account_id,
            ip = %event.ip,
            country = ?event.country,
            reason = ?event.reason,
            count = ?event.count,
            "Access event"
        );
        Ok(())
    }
}

/// Queues events for an out-of-band consumer
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<AccessEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AccessEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelNotifier { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &AccessEvent) -> Result<(), NotifyError> {
        self.sender
            .send(event.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

/// Fans an event out to every notifier. Failures are logged, never returned.
pub(crate) fn dispatch(notifiers: &[Arc<dyn Notifier>], event: AccessEvent) {
    for notifier in notifiers {
        if let Err(error) = notifier.notify(&event) {
            warn!(kind = ?event.kind, ip = %event.ip, %error, "Failed to deliver access event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _: &AccessEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Other(anyhow::anyhow!("smtp down")))
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_delivery() {
        let (channel, mut receiver) = ChannelNotifier::new();
        let notifiers: Vec<Arc<dyn Notifier>> =
            vec![Arc::new(FailingNotifier), Arc::new(LogNotifier), Arc::new(channel)];

        dispatch(
            &notifiers,
            AccessEvent::new(AccessEventKind::DeviceKicked, Some(Uuid::nil()), "1.2.3.4")
                .with_reason("kicked by admin"),
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind, AccessEventKind::DeviceKicked);
        assert_eq!(event.reason.as_deref(), Some("kicked by admin"));
    }

    #[test]
    fn test_closed_channel_is_an_error() {
        let (channel, receiver) = ChannelNotifier::new();
        drop(receiver);
        let event = AccessEvent::new(AccessEventKind::NewDevice, None, "1.2.3.4");
        assert!(matches!(channel.notify(&event), Err(NotifyError::ChannelClosed)));
        let notifiers: [Arc<dyn Notifier>; 1] = [Arc::new(channel)];
        dispatch(&notifiers, event);
    }
}
