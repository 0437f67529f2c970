mod defaults;
mod restrictions;

use std::path::PathBuf;
use std::time::Duration;

use defaults::*;
pub use restrictions::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Secret;

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct GeoIpConfig {
    /// Path to a MaxMind City database. Geo restriction is inert without one.
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "_default_geo_cache_ttl", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub cache_ttl: Duration,

    /// Whether lookups that resolve to nothing are stored in the cache
    #[serde(default = "_default_true")]
    pub cache_failed_lookups: bool,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            database: None,
            cache_ttl: _default_geo_cache_ttl(),
            cache_failed_lookups: true,
        }
    }
}

impl GeoIpConfig {
    pub fn database_path(&self, relative_to: &std::path::Path) -> Option<PathBuf> {
        self.database.as_ref().map(|db| {
            let path = PathBuf::from(db);
            if path.is_absolute() {
                path
            } else {
                relative_to.join(path)
            }
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct MaintenanceConfig {
    #[serde(default = "_default_true")]
    pub enable: bool,

    #[serde(default = "_default_maintenance_interval", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub interval: Duration,

    #[serde(default = "_default_history_retention_days")]
    pub history_retention_days: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enable: true,
            interval: _default_maintenance_interval(),
            history_retention_days: _default_history_retention_days(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct LogConfig {
    /// Emit one log line per access decision
    #[serde(default = "_default_false")]
    pub log_decisions: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_decisions: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct TollgateConfigStore {
    #[serde(default = "_default_database_url")]
    #[schemars(with = "String")]
    pub database_url: Secret<String>,

    #[serde(default)]
    pub geoip: GeoIpConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for TollgateConfigStore {
    fn default() -> Self {
        Self {
            database_url: _default_database_url(),
            geoip: <_>::default(),
            maintenance: <_>::default(),
            log: <_>::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TollgateConfig {
    pub store: TollgateConfigStore,
    pub paths_relative_to: PathBuf,
}

impl TollgateConfig {
    pub fn geoip_database_path(&self) -> Option<PathBuf> {
        self.store.geoip.database_path(&self.paths_relative_to)
    }

    pub fn validate(&self) {
        if self.store.geoip.database.is_none() {
            warn!("No `geoip.database` configured - geo restriction will always allow.");
        }
        if self.store.geoip.cache_ttl.is_zero() {
            warn!("`geoip.cache_ttl` is zero - every lookup will hit the geolocation database.");
        }
        if self.store.maintenance.history_retention_days == 0 {
            warn!("`maintenance.history_retention_days` is zero - access history is purged on every sweep.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_defaults_from_empty_document() {
        let store: TollgateConfigStore = serde_json::from_str("{}").unwrap();
        assert_eq!(store.database_url.expose_secret(), "sqlite:data/db");
        assert_eq!(store.geoip.cache_ttl, Duration::from_secs(86400));
        assert!(store.geoip.cache_failed_lookups);
        assert_eq!(store.maintenance.history_retention_days, 30);
    }

    #[test]
    fn test_humantime_durations() {
        let store: TollgateConfigStore = serde_json::from_str(
            r#"{"geoip": {"cache_ttl": "2h", "cache_failed_lookups": false}, "maintenance": {"interval": "30s"}}"#,
        )
        .unwrap();
        assert_eq!(store.geoip.cache_ttl, Duration::from_secs(7200));
        assert!(!store.geoip.cache_failed_lookups);
        assert_eq!(store.maintenance.interval, Duration::from_secs(30));
    }

    #[test]
    fn test_geoip_path_resolves_relative_to_config() {
        let config = TollgateConfig {
            store: TollgateConfigStore {
                geoip: GeoIpConfig {
                    database: Some("geo/City.mmdb".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
            paths_relative_to: PathBuf::from("/etc/tollgate"),
        };
        assert_eq!(
            config.geoip_database_path(),
            Some(PathBuf::from("/etc/tollgate/geo/City.mmdb"))
        );
    }
}
