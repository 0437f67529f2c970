use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Key of the settings row holding the serialized [RestrictionSettings]
pub const RESTRICTION_SETTINGS_KEY: &str = "ip_restriction";

/// Process-wide access restriction policy, persisted as a single settings blob
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct RestrictionSettings {
    #[serde(default = "_default_true")]
    pub enabled: bool,

    /// Applied when a caller does not pass an explicit limit. Zero means unlimited.
    #[serde(default = "_default_max_concurrent_sessions")]
    pub default_max_concurrent_sessions: u32,

    #[serde(default = "_default_inactivity_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub inactivity_timeout: Duration,

    #[serde(default = "_default_false")]
    pub geo_restriction_enabled: bool,

    /// ISO country codes. When non-empty, only these countries are admitted.
    #[serde(default = "_default_empty_vec::<String>")]
    pub allowed_countries: Vec<String>,

    /// ISO country codes that are always denied
    #[serde(default = "_default_empty_vec::<String>")]
    pub blocked_countries: Vec<String>,

    #[serde(default = "_default_true")]
    pub auto_blacklist_enabled: bool,

    #[serde(default = "_default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    #[serde(default = "_default_failed_attempt_window", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub failed_attempt_window: Duration,

    #[serde(default = "_default_auto_blacklist_duration", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub auto_blacklist_duration: Duration,
}

impl Default for RestrictionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_max_concurrent_sessions: _default_max_concurrent_sessions(),
            inactivity_timeout: _default_inactivity_timeout(),
            geo_restriction_enabled: false,
            allowed_countries: vec![],
            blocked_countries: vec![],
            auto_blacklist_enabled: true,
            max_failed_attempts: _default_max_failed_attempts(),
            failed_attempt_window: _default_failed_attempt_window(),
            auto_blacklist_duration: _default_auto_blacklist_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_blob_fills_defaults() {
        let settings: RestrictionSettings =
            serde_json::from_str(r#"{"blocked_countries": ["CN"], "inactivity_timeout": "10m"}"#)
                .unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.blocked_countries, vec!["CN".to_string()]);
        assert_eq!(settings.inactivity_timeout, Duration::from_secs(600));
        assert_eq!(settings.max_failed_attempts, 10);
    }

    #[test]
    fn test_blob_roundtrip_preserves_durations() {
        let settings = RestrictionSettings {
            failed_attempt_window: Duration::from_secs(90),
            ..Default::default()
        };
        let blob = serde_json::to_string(&settings).unwrap();
        assert!(blob.contains("\"1m 30s\""));
        let parsed: RestrictionSettings = serde_json::from_str(&blob).unwrap();
        assert_eq!(parsed, settings);
    }
}
