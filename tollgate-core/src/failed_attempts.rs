use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use tokio::sync::Mutex;
use tollgate_common::TollgateError;
use tollgate_db_entities::FailedAttempt;
use tracing::debug;
use uuid::Uuid;

use crate::consts::cutoff_before;

/// Append-only log of failed attempts, counted over a sliding window
pub struct FailedAttemptLedger {
    db: Arc<Mutex<DatabaseConnection>>,
}

impl FailedAttemptLedger {
    pub fn new(db: Arc<Mutex<DatabaseConnection>>) -> Self {
        Self { db }
    }

    pub async fn record(&self, ip: &str, reason: &str) -> Result<(), TollgateError> {
        let db = self.db.lock().await;
        FailedAttempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip: Set(ip.to_owned()),
            reason: Set(reason.to_owned()),
            created_at: Set(Utc::now()),
        }
        .insert(&*db)
        .await?;
        debug!(ip = %ip, reason = %reason, "Recorded failed attempt");
        Ok(())
    }

    /// Attempts from `ip` within [now - window, now]
    pub async fn count_in_window(&self, ip: &str, window: Duration) -> Result<u64, TollgateError> {
        let since = cutoff_before(window);
        let db = self.db.lock().await;
        Ok(FailedAttempt::Entity::find()
            .filter(FailedAttempt::Column::Ip.eq(ip))
            .filter(FailedAttempt::Column::CreatedAt.gte(since))
            .count(&*db)
            .await?)
    }

    /// Purges records older than twice the window
    pub async fn cleanup(&self, window: Duration) -> Result<u64, TollgateError> {
        let cutoff = cutoff_before(window.checked_mul(2).unwrap_or(Duration::MAX));
        let db = self.db.lock().await;
        let result = FailedAttempt::Entity::delete_many()
            .filter(FailedAttempt::Column::CreatedAt.lt(cutoff))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_for_ip(&self, ip: &str) -> Result<u64, TollgateError> {
        let db = self.db.lock().await;
        let result = FailedAttempt::Entity::delete_many()
            .filter(FailedAttempt::Column::Ip.eq(ip))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::connect_test_db;

    async fn insert_aged(db: &Arc<Mutex<DatabaseConnection>>, ip: &str, age: Duration) {
        let db = db.lock().await;
        FailedAttempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip: Set(ip.to_owned()),
            reason: Set("old".to_owned()),
            created_at: Set(Utc::now() - age),
        }
        .insert(&*db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_window_count() {
        let db = connect_test_db().await;
        let ledger = FailedAttemptLedger::new(db.clone());
        ledger.record("1.2.3.4", "bad token").await.unwrap();
        ledger.record("1.2.3.4", "bad token").await.unwrap();
        ledger.record("4.3.2.1", "bad token").await.unwrap();
        insert_aged(&db, "1.2.3.4", Duration::minutes(20)).await;

        let window = Duration::minutes(15);
        assert_eq!(ledger.count_in_window("1.2.3.4", window).await.unwrap(), 2);
        assert_eq!(ledger.count_in_window("4.3.2.1", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_double_window() {
        let db = connect_test_db().await;
        let ledger = FailedAttemptLedger::new(db.clone());
        insert_aged(&db, "1.2.3.4", Duration::minutes(20)).await;
        insert_aged(&db, "1.2.3.4", Duration::minutes(40)).await;

        assert_eq!(ledger.cleanup(Duration::minutes(15)).await.unwrap(), 1);
        assert_eq!(ledger.cleanup(Duration::minutes(15)).await.unwrap(), 0);
        assert_eq!(ledger.delete_for_ip("1.2.3.4").await.unwrap(), 1);
    }
}
