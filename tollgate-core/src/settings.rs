use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;
use tollgate_common::{RestrictionSettings, TollgateError, RESTRICTION_SETTINGS_KEY};
use tollgate_db_entities::Setting;
use tracing::debug;

/// Persists [RestrictionSettings] as one JSON blob in the settings table
pub struct SettingsStore {
    db: Arc<Mutex<DatabaseConnection>>,
}

impl SettingsStore {
    pub fn new(db: Arc<Mutex<DatabaseConnection>>) -> Self {
        Self { db }
    }

    /// Defaults apply when nothing has been saved yet
    pub async fn load(&self) -> Result<RestrictionSettings, TollgateError> {
        let db = self.db.lock().await;
        match Setting::Entity::get_value(&*db, RESTRICTION_SETTINGS_KEY).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => {
                debug!("No stored restriction settings, using defaults");
                Ok(RestrictionSettings::default())
            }
        }
    }

    pub async fn save(&self, settings: &RestrictionSettings) -> Result<(), TollgateError> {
        let blob = serde_json::to_string(settings)?;
        let db = self.db.lock().await;
        Setting::Entity::set_value(&*db, RESTRICTION_SETTINGS_KEY, blob).await?;
        Ok(())
    }
}
