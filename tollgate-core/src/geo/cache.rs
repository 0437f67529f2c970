use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tokio::sync::Mutex;
use tollgate_common::{GeoIpConfig, TollgateError};
use tollgate_db_entities::GeoCache;
use tracing::{debug, warn};

use super::{GeoInfo, GeoReaderSlot};
use crate::consts::{cutoff_before, to_chrono_duration};

/// Result of a country restriction check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeoRestriction {
    pub allowed: bool,
    pub country_code: Option<String>,
}

impl GeoRestriction {
    fn allow(country_code: Option<String>) -> Self {
        Self {
            allowed: true,
            country_code,
        }
    }
}

/// TTL cache in front of the geolocation database, persisted in `geo_cache`
pub struct GeolocationCache {
    db: Arc<Mutex<DatabaseConnection>>,
    reader: Arc<GeoReaderSlot>,
    ttl: Duration,
    cache_failed_lookups: bool,
}

impl GeolocationCache {
    pub fn new(
        db: Arc<Mutex<DatabaseConnection>>,
        reader: Arc<GeoReaderSlot>,
        config: &GeoIpConfig,
    ) -> Self {
        Self {
            db,
            reader,
            ttl: config.cache_ttl,
            cache_failed_lookups: config.cache_failed_lookups,
        }
    }

    pub fn reader(&self) -> &Arc<GeoReaderSlot> {
        &self.reader
    }

    pub async fn lookup(&self, ip: &str) -> Result<GeoInfo, TollgateError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| TollgateError::GeolocationFailed(format!("invalid IP address: {ip}")))?;
        let key = addr.to_string();
        let now = Utc::now();

        {
            let db = self.db.lock().await;
            if let Some(cached) = GeoCache::Entity::find_by_id(key.clone()).one(&*db).await? {
                if now - cached.cached_at < to_chrono_duration(self.ttl) {
                    debug!(ip = %key, "Geolocation cache hit");
                    return Ok(cached.into());
                }
            }
        }

        let info = self.reader.lookup(addr).await?.unwrap_or_default();

        if info.is_resolved() || self.cache_failed_lookups {
            let db = self.db.lock().await;
            GeoCache::Entity::insert(GeoCache::ActiveModel {
                ip: Set(key),
                country: Set(info.country.clone()),
                country_code: Set(info.country_code.clone()),
                region: Set(info.region.clone()),
                city: Set(info.city.clone()),
                latitude: Set(info.latitude),
                longitude: Set(info.longitude),
                isp: Set(info.isp.clone()),
                cached_at: Set(now),
            })
            .on_conflict(
                OnConflict::column(GeoCache::Column::Ip)
                    .update_columns([
                        GeoCache::Column::Country,
                        GeoCache::Column::CountryCode,
                        GeoCache::Column::Region,
                        GeoCache::Column::City,
                        GeoCache::Column::Latitude,
                        GeoCache::Column::Longitude,
                        GeoCache::Column::Isp,
                        GeoCache::Column::CachedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*db)
            .await?;
        }

        Ok(info)
    }

    /// Best effort: addresses that fail to resolve are left out
    pub async fn lookup_batch<S: AsRef<str>>(&self, ips: &[S]) -> HashMap<String, GeoInfo> {
        let mut result = HashMap::new();
        for ip in ips {
            let ip = ip.as_ref();
            match self.lookup(ip).await {
                Ok(info) => {
                    result.insert(ip.to_owned(), info);
                }
                Err(error) => debug!(ip = %ip, %error, "Skipping address in batch lookup"),
            }
        }
        result
    }

    /// Blocked countries win over allowed ones. Lookup failures allow.
    pub async fn check_geo_restriction(
        &self,
        ip: &str,
        allowed_countries: &[String],
        blocked_countries: &[String],
    ) -> GeoRestriction {
        if allowed_countries.is_empty() && blocked_countries.is_empty() {
            return GeoRestriction::allow(None);
        }

        let info = match self.lookup(ip).await {
            Ok(info) => info,
            Err(error) => {
                warn!(ip = %ip, %error, "Geolocation failed, not applying country restriction");
                return GeoRestriction::allow(None);
            }
        };

        let Some(code) = info.country_code else {
            return GeoRestriction::allow(None);
        };

        let listed = |list: &[String]| list.iter().any(|c| c.eq_ignore_ascii_case(&code));

        if listed(blocked_countries) {
            return GeoRestriction {
                allowed: false,
                country_code: Some(code),
            };
        }

        if !allowed_countries.is_empty() && !listed(allowed_countries) {
            return GeoRestriction {
                allowed: false,
                country_code: Some(code),
            };
        }

        GeoRestriction::allow(Some(code))
    }

    /// Removes cache rows older than the TTL
    pub async fn cleanup_expired(&self) -> Result<u64, TollgateError> {
        let cutoff = cutoff_before(to_chrono_duration(self.ttl));
        let db = self.db.lock().await;
        let result = GeoCache::Entity::delete_many()
            .filter(GeoCache::Column::CachedAt.lt(cutoff))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }
}
