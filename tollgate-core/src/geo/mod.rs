mod cache;
mod reader;

use std::net::IpAddr;

pub use cache::{GeoRestriction, GeolocationCache};
pub use reader::{GeoReaderSlot, MaxMindGeoDatabase, StaticGeoDatabase};
use serde::Serialize;
use tollgate_common::TollgateError;
use tollgate_db_entities::GeoCache;

/// Location of an IP address. All fields are empty for unresolvable addresses.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub isp: Option<String>,
}

impl GeoInfo {
    pub fn is_resolved(&self) -> bool {
        self.country_code.is_some()
    }
}

impl From<GeoCache::Model> for GeoInfo {
    fn from(model: GeoCache::Model) -> Self {
        Self {
            country: model.country,
            country_code: model.country_code,
            region: model.region,
            city: model.city,
            latitude: model.latitude,
            longitude: model.longitude,
            isp: model.isp,
        }
    }
}

/// Point lookup against an external geolocation database
pub trait GeoDatabase: Send + Sync {
    /// Returns `Ok(None)` when the database has no record for the address
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoInfo>, TollgateError>;
}
