use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use maxminddb::{geoip2, MaxMindDBError, Reader};
use tokio::sync::RwLock;
use tollgate_common::TollgateError;
use tracing::{debug, info};

use super::{GeoDatabase, GeoInfo};

pub struct MaxMindGeoDatabase {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoDatabase {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TollgateError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TollgateError::GeolocationFailed(format!(
                "GeoIP database not found at {}",
                path.display()
            )));
        }
        let reader = Reader::open_readfile(path).map_err(|e| {
            TollgateError::GeolocationFailed(format!(
                "failed to open GeoIP database {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { reader })
    }
}

fn english_name(names: Option<&std::collections::BTreeMap<&str, &str>>) -> Option<String> {
    names.and_then(|n| n.get("en")).map(|s| s.to_string())
}

impl GeoDatabase for MaxMindGeoDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoInfo>, TollgateError> {
        let city: geoip2::City = match self.reader.lookup(ip) {
            Ok(city) => city,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(None),
            Err(e) => return Err(TollgateError::GeolocationFailed(e.to_string())),
        };

        // Present only in ISP/enterprise editions
        let isp = self
            .reader
            .lookup::<geoip2::Isp>(ip)
            .ok()
            .and_then(|i| i.isp.map(String::from));

        let country = city.country.as_ref();
        let location = city.location.as_ref();
        Ok(Some(GeoInfo {
            country: country.and_then(|c| english_name(c.names.as_ref())),
            country_code: country.and_then(|c| c.iso_code.map(String::from)),
            region: city
                .subdivisions
                .as_ref()
                .and_then(|s| s.first())
                .and_then(|s| english_name(s.names.as_ref())),
            city: city
                .city
                .as_ref()
                .and_then(|c| english_name(c.names.as_ref())),
            latitude: location.and_then(|l| l.latitude),
            longitude: location.and_then(|l| l.longitude),
            isp,
        }))
    }
}

/// Fixed in-memory table, for tests and deployments without a MaxMind file
#[derive(Default)]
pub struct StaticGeoDatabase {
    entries: HashMap<IpAddr, GeoInfo>,
}

impl StaticGeoDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_country(mut self, ip: IpAddr, country_code: &str, country: &str) -> Self {
        self.entries.insert(
            ip,
            GeoInfo {
                country: Some(country.to_owned()),
                country_code: Some(country_code.to_owned()),
                ..Default::default()
            },
        );
        self
    }

    pub fn insert(&mut self, ip: IpAddr, info: GeoInfo) {
        self.entries.insert(ip, info);
    }
}

impl GeoDatabase for StaticGeoDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoInfo>, TollgateError> {
        Ok(self.entries.get(&ip).cloned())
    }
}

/// Swappable handle to the geolocation database.
/// Lookups share a read lock, reloads take the write lock.
pub struct GeoReaderSlot {
    inner: RwLock<Option<Arc<dyn GeoDatabase>>>,
}

impl GeoReaderSlot {
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn with_database(database: Arc<dyn GeoDatabase>) -> Self {
        Self {
            inner: RwLock::new(Some(database)),
        }
    }

    pub async fn open(path: &Path) -> Result<Self, TollgateError> {
        let slot = Self::empty();
        slot.reload(path).await?;
        Ok(slot)
    }

    /// Loads a new database file and swaps it in. The previous database stays
    /// in service if loading fails.
    pub async fn reload(&self, path: &Path) -> Result<(), TollgateError> {
        let path: PathBuf = path.to_owned();
        let database = tokio::task::spawn_blocking({
            let path = path.clone();
            move || MaxMindGeoDatabase::open(path)
        })
        .await
        .map_err(TollgateError::other)??;

        self.replace(Some(Arc::new(database))).await;
        info!(path = %path.display(), "Loaded GeoIP database");
        Ok(())
    }

    pub async fn replace(&self, database: Option<Arc<dyn GeoDatabase>>) {
        *self.inner.write().await = database;
    }

    pub async fn close(&self) {
        self.replace(None).await;
        debug!("GeoIP database closed");
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.is_some()
    }

    pub async fn lookup(&self, ip: IpAddr) -> Result<Option<GeoInfo>, TollgateError> {
        let inner = self.inner.read().await;
        let Some(database) = inner.as_ref() else {
            return Err(TollgateError::GeolocationUnavailable);
        };
        database.lookup(ip)
    }
}

impl Default for GeoReaderSlot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_empty_slot_is_unavailable() {
        let slot = GeoReaderSlot::empty();
        assert!(!slot.is_loaded().await);
        assert!(matches!(
            slot.lookup(ip("1.1.1.1")).await,
            Err(TollgateError::GeolocationUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_replace_and_close() {
        let slot = GeoReaderSlot::empty();
        slot.replace(Some(Arc::new(
            StaticGeoDatabase::new().with_country(ip("1.1.1.1"), "AU", "Australia"),
        )))
        .await;
        let info = slot.lookup(ip("1.1.1.1")).await.unwrap().unwrap();
        assert_eq!(info.country_code.as_deref(), Some("AU"));
        assert!(slot.lookup(ip("8.8.8.8")).await.unwrap().is_none());

        slot.close().await;
        assert!(!slot.is_loaded().await);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_database() {
        let slot = GeoReaderSlot::with_database(Arc::new(
            StaticGeoDatabase::new().with_country(ip("1.1.1.1"), "AU", "Australia"),
        ));
        let result = slot
            .reload(Path::new("/nonexistent/GeoLite2-City.mmdb"))
            .await;
        assert!(matches!(result, Err(TollgateError::GeolocationFailed(_))));
        assert!(slot.lookup(ip("1.1.1.1")).await.unwrap().is_some());
    }
}
