use std::sync::Arc;

use anyhow::Result;
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tollgate_common::TollgateConfig;
use tracing::{info, warn};

use crate::access_control::AccessControlService;
use crate::db::connect_to_db;
use crate::geo::{GeoReaderSlot, GeolocationCache};
use crate::notifications::{LogNotifier, Notifier};

#[derive(Clone)]
pub struct Services {
    pub db: Arc<Mutex<DatabaseConnection>>,
    pub config: Arc<TollgateConfig>,
    pub geo_reader: Arc<GeoReaderSlot>,
    pub access_control: Arc<AccessControlService>,
}

impl Services {
    pub async fn new(config: TollgateConfig) -> Result<Self> {
        Self::with_notifiers(config, vec![Arc::new(LogNotifier)]).await
    }

    pub async fn with_notifiers(
        config: TollgateConfig,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Result<Self> {
        let db = connect_to_db(&config).await?;
        let db = Arc::new(Mutex::new(db));

        // A missing or broken GeoIP database only disables geo restriction
        let geo_reader = match config.geoip_database_path() {
            Some(path) => match GeoReaderSlot::open(&path).await {
                Ok(slot) => slot,
                Err(error) => {
                    warn!(path = %path.display(), %error, "Could not open GeoIP database");
                    GeoReaderSlot::empty()
                }
            },
            None => GeoReaderSlot::empty(),
        };
        let geo_reader = Arc::new(geo_reader);

        let geo = Arc::new(GeolocationCache::new(
            db.clone(),
            geo_reader.clone(),
            &config.store.geoip,
        ));

        let mut access_control = AccessControlService::new(db.clone(), geo, &config.store).await?;
        for notifier in notifiers {
            access_control = access_control.with_notifier(notifier);
        }

        Ok(Self {
            db,
            config: Arc::new(config),
            geo_reader,
            access_control: Arc::new(access_control),
        })
    }

    /// Spawns the periodic sweep, or returns `None` when maintenance is disabled
    pub fn start_maintenance(&self) -> Option<JoinHandle<()>> {
        let maintenance = &self.config.store.maintenance;
        if !maintenance.enable {
            return None;
        }

        let access_control = self.access_control.clone();
        let period = maintenance.interval;
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match access_control.run_maintenance().await {
                    Ok(stats) => {
                        if stats.total() > 0 {
                            info!(
                                inactive_sessions = stats.inactive_sessions_removed,
                                expired_blacklist = stats.expired_blacklist_removed,
                                old_failed_attempts = stats.old_failed_attempts_removed,
                                old_history = stats.old_history_removed,
                                expired_geo_cache = stats.expired_geo_cache_removed,
                                "Maintenance completed"
                            );
                        }
                    }
                    Err(e) => {
                        warn!("Maintenance failed: {}", e);
                    }
                }
            }
        }))
    }
}
