use std::time::Duration;

use chrono::{DateTime, Utc};
use tollgate_common::TollgateError;

/// More distinct countries than this inside the trailing window is suspicious
pub const SUSPICIOUS_COUNTRY_THRESHOLD: usize = 3;
pub const SUSPICIOUS_WINDOW_MINUTES: i64 = 30;

/// Lookback for the history-based unique IP statistic
pub const UNIQUE_IP_WINDOW_DAYS: i64 = 30;

pub const RECENT_SESSIONS_LIMIT: usize = 10;
pub const RECENT_SUBSCRIPTION_IPS_LIMIT: usize = 10;

/// Upper bound for configured and caller-supplied durations
pub const MAX_DURATION_DAYS: i64 = 365 * 100;

/// Clamped to [`MAX_DURATION_DAYS`]
pub(crate) fn to_chrono_duration(duration: Duration) -> chrono::Duration {
    let max = chrono::Duration::days(MAX_DURATION_DAYS);
    chrono::Duration::from_std(duration)
        .map(|d| d.min(max))
        .unwrap_or(max)
}

/// `now - window`, saturating at the earliest representable instant
pub(crate) fn cutoff_before(window: chrono::Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn expiry_after(duration: Duration) -> Result<DateTime<Utc>, TollgateError> {
    Utc::now()
        .checked_add_signed(to_chrono_duration(duration))
        .ok_or(TollgateError::DurationOutOfRange(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_are_clamped() {
        let huge = Duration::from_secs(60 * 60 * 24 * 365 * 300_000);
        assert_eq!(
            to_chrono_duration(huge),
            chrono::Duration::days(MAX_DURATION_DAYS)
        );
        assert_eq!(to_chrono_duration(Duration::MAX), chrono::Duration::days(MAX_DURATION_DAYS));
        assert_eq!(
            to_chrono_duration(Duration::from_secs(90)),
            chrono::Duration::seconds(90)
        );
    }

    #[test]
    fn test_time_arithmetic_does_not_overflow() {
        assert_eq!(cutoff_before(chrono::Duration::MAX), DateTime::<Utc>::MIN_UTC);
        let expiry = expiry_after(Duration::MAX).unwrap();
        assert!(expiry > Utc::now() + chrono::Duration::days(MAX_DURATION_DAYS - 1));
    }
}
