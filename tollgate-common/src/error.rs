use std::error::Error;

use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum TollgateError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("invalid IP address or CIDR range: {0}")]
    InvalidCidr(String),
    #[error("geolocation lookup failed: {0}")]
    GeolocationFailed(String),
    #[error("no geolocation database is loaded")]
    GeolocationUnavailable,
    #[error("no active session for {ip} on account {account_id}")]
    KickFailed { account_id: Uuid, ip: String },
    #[error("duration out of range: {0:?}")]
    DurationOutOfRange(std::time::Duration),
    #[error("access list entry {0} not found")]
    ListEntryNotFound(Uuid),
    #[error("deserialization failed: {0}")]
    DeserializeJson(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TollgateError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }

    /// Stable code reported to API consumers, if this error has one
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCidr(_) => Some("INVALID_CIDR"),
            Self::GeolocationFailed(_) | Self::GeolocationUnavailable => {
                Some("GEOLOCATION_FAILED")
            }
            Self::KickFailed { .. } => Some("IP_KICK_FAILED"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TollgateError::InvalidCidr("10.0.0.0/33".into()).code(),
            Some("INVALID_CIDR")
        );
        assert_eq!(
            TollgateError::GeolocationUnavailable.code(),
            Some("GEOLOCATION_FAILED")
        );
        assert_eq!(
            TollgateError::KickFailed {
                account_id: Uuid::nil(),
                ip: "1.2.3.4".into()
            }
            .code(),
            Some("IP_KICK_FAILED")
        );
        assert_eq!(TollgateError::ListEntryNotFound(Uuid::nil()).code(), None);
    }
}
