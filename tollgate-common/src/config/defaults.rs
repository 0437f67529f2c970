use std::time::Duration;

use crate::Secret;

pub(crate) const fn _default_true() -> bool {
    true
}

pub(crate) const fn _default_false() -> bool {
    false
}

#[inline]
pub(crate) fn _default_database_url() -> Secret<String> {
    Secret::new("sqlite:data/db".to_owned())
}

#[inline]
pub(crate) fn _default_geo_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

#[inline]
pub(crate) fn _default_maintenance_interval() -> Duration {
    Duration::from_secs(60 * 5)
}

pub(crate) const fn _default_history_retention_days() -> u32 {
    30
}

pub(crate) const fn _default_max_concurrent_sessions() -> u32 {
    3
}

#[inline]
pub(crate) fn _default_inactivity_timeout() -> Duration {
    Duration::from_secs(60 * 5)
}

pub(crate) const fn _default_max_failed_attempts() -> u32 {
    10
}

#[inline]
pub(crate) fn _default_failed_attempt_window() -> Duration {
    Duration::from_secs(60 * 15)
}

#[inline]
pub(crate) fn _default_auto_blacklist_duration() -> Duration {
    Duration::from_secs(60 * 60)
}

#[inline]
pub(crate) fn _default_empty_vec<T>() -> Vec<T> {
    vec![]
}
