use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tollgate_common::TollgateError;
use tollgate_db_entities::AccessHistory::{self, AccessType};
use tollgate_db_entities::ActiveSession::{self, DeviceType};
use tracing::debug;
use uuid::Uuid;

use crate::consts::cutoff_before;

/// Session metadata written on every accepted access
#[derive(Clone, Debug)]
pub struct SessionUpdate {
    pub account_id: Uuid,
    pub ip: String,
    pub user_agent: String,
    pub device_type: DeviceType,
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct OnlineSession {
    pub ip: String,
    pub user_agent: String,
    pub device_type: DeviceType,
    pub country: Option<String>,
    pub city: Option<String>,
    pub last_active: DateTime<Utc>,
    pub connected_since: DateTime<Utc>,
}

impl From<ActiveSession::Model> for OnlineSession {
    fn from(model: ActiveSession::Model) -> Self {
        Self {
            ip: model.ip,
            user_agent: model.user_agent,
            device_type: model.device_type,
            country: model.country,
            city: model.city,
            last_active: model.last_active,
            connected_since: model.created_at,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewHistoryRecord {
    pub account_id: Uuid,
    pub ip: String,
    pub user_agent: String,
    pub access_type: AccessType,
    pub country: Option<String>,
    pub city: Option<String>,
    pub is_suspicious: bool,
}

#[derive(Clone, Debug)]
pub struct HistoryFilter {
    pub account_id: Option<Uuid>,
    pub ip: Option<String>,
    pub access_type: Option<AccessType>,
    pub suspicious_only: bool,
    pub since: Option<DateTime<Utc>>,
    /// Zero-based
    pub page: u64,
    pub per_page: u64,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            account_id: None,
            ip: None,
            access_type: None,
            suspicious_only: false,
            since: None,
            page: 0,
            per_page: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryPage {
    pub items: Vec<AccessHistory::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CountryCount {
    pub country: String,
    pub ips: u64,
}

/// Live sessions and the append-only access history
pub struct SessionTracker {
    db: Arc<Mutex<DatabaseConnection>>,
}

impl SessionTracker {
    pub fn new(db: Arc<Mutex<DatabaseConnection>>) -> Self {
        Self { db }
    }

    /// Inserts the (account, ip) session or refreshes its metadata in one statement
    pub async fn add_active_session(&self, session: SessionUpdate) -> Result<(), TollgateError> {
        let now = Utc::now();
        let db = self.db.lock().await;
        ActiveSession::Entity::insert(ActiveSession::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(session.account_id),
            ip: Set(session.ip),
            user_agent: Set(session.user_agent),
            device_type: Set(session.device_type),
            country: Set(session.country),
            city: Set(session.city),
            last_active: Set(now),
            created_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([ActiveSession::Column::AccountId, ActiveSession::Column::Ip])
                .update_columns([
                    ActiveSession::Column::UserAgent,
                    ActiveSession::Column::DeviceType,
                    ActiveSession::Column::Country,
                    ActiveSession::Column::City,
                    ActiveSession::Column::LastActive,
                ])
                .to_owned(),
        )
        .exec_without_returning(&*db)
        .await?;
        Ok(())
    }

    /// Returns the number of rows removed
    pub async fn remove_active_session(
        &self,
        account_id: Uuid,
        ip: &str,
    ) -> Result<u64, TollgateError> {
        let db = self.db.lock().await;
        let result = ActiveSession::Entity::delete_many()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .filter(ActiveSession::Column::Ip.eq(ip))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn get_active_session_count(&self, account_id: Uuid) -> Result<u64, TollgateError> {
        let db = self.db.lock().await;
        Ok(ActiveSession::Entity::find()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .count(&*db)
            .await?)
    }

    /// Most recently active first
    pub async fn get_active_sessions(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<ActiveSession::Model>, TollgateError> {
        let db = self.db.lock().await;
        Ok(ActiveSession::Entity::find()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .order_by_desc(ActiveSession::Column::LastActive)
            .all(&*db)
            .await?)
    }

    /// Sessions seen within `timeout`, without sweeping the stale ones
    pub async fn get_online_sessions(
        &self,
        account_id: Uuid,
        timeout: Duration,
    ) -> Result<Vec<OnlineSession>, TollgateError> {
        let cutoff = cutoff_before(timeout);
        let db = self.db.lock().await;
        let sessions = ActiveSession::Entity::find()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .filter(ActiveSession::Column::LastActive.gte(cutoff))
            .order_by_asc(ActiveSession::Column::CreatedAt)
            .all(&*db)
            .await?;
        Ok(sessions.into_iter().map(Into::into).collect())
    }

    pub async fn get_session(
        &self,
        account_id: Uuid,
        ip: &str,
    ) -> Result<Option<ActiveSession::Model>, TollgateError> {
        let db = self.db.lock().await;
        Ok(ActiveSession::Entity::find()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .filter(ActiveSession::Column::Ip.eq(ip))
            .one(&*db)
            .await?)
    }

    pub async fn is_session_active(
        &self,
        account_id: Uuid,
        ip: &str,
    ) -> Result<bool, TollgateError> {
        let db = self.db.lock().await;
        let count = ActiveSession::Entity::find()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .filter(ActiveSession::Column::Ip.eq(ip))
            .count(&*db)
            .await?;
        Ok(count > 0)
    }

    /// Heartbeat. Returns false if there was no session to refresh.
    pub async fn update_last_active(
        &self,
        account_id: Uuid,
        ip: &str,
    ) -> Result<bool, TollgateError> {
        let db = self.db.lock().await;
        let result = ActiveSession::Entity::update_many()
            .col_expr(ActiveSession::Column::LastActive, Expr::value(Utc::now()))
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .filter(ActiveSession::Column::Ip.eq(ip))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn cleanup_inactive_sessions(&self, timeout: Duration) -> Result<u64, TollgateError> {
        let cutoff = cutoff_before(timeout);
        let db = self.db.lock().await;
        let result = ActiveSession::Entity::delete_many()
            .filter(ActiveSession::Column::LastActive.lt(cutoff))
            .exec(&*db)
            .await?;
        if result.rows_affected > 0 {
            debug!(removed = result.rows_affected, "Swept inactive sessions");
        }
        Ok(result.rows_affected)
    }

    pub async fn cleanup_inactive_sessions_for_account(
        &self,
        account_id: Uuid,
        timeout: Duration,
    ) -> Result<u64, TollgateError> {
        let cutoff = cutoff_before(timeout);
        let db = self.db.lock().await;
        let result = ActiveSession::Entity::delete_many()
            .filter(ActiveSession::Column::AccountId.eq(account_id))
            .filter(ActiveSession::Column::LastActive.lt(cutoff))
            .exec(&*db)
            .await?;
        if result.rows_affected > 0 {
            debug!(account_id = %account_id, removed = result.rows_affected, "Swept inactive sessions");
        }
        Ok(result.rows_affected)
    }

    pub async fn record_history(
        &self,
        record: NewHistoryRecord,
    ) -> Result<AccessHistory::Model, TollgateError> {
        let db = self.db.lock().await;
        Ok(AccessHistory::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(record.account_id),
            ip: Set(record.ip),
            user_agent: Set(record.user_agent),
            access_type: Set(record.access_type),
            country: Set(record.country),
            city: Set(record.city),
            is_suspicious: Set(record.is_suspicious),
            created_at: Set(Utc::now()),
        }
        .insert(&*db)
        .await?)
    }

    /// Newest first
    pub async fn get_history(&self, filter: &HistoryFilter) -> Result<HistoryPage, TollgateError> {
        let mut query = AccessHistory::Entity::find();
        if let Some(account_id) = filter.account_id {
            query = query.filter(AccessHistory::Column::AccountId.eq(account_id));
        }
        if let Some(ip) = &filter.ip {
            query = query.filter(AccessHistory::Column::Ip.eq(ip.as_str()));
        }
        if let Some(access_type) = filter.access_type {
            query = query.filter(AccessHistory::Column::AccessType.eq(access_type));
        }
        if filter.suspicious_only {
            query = query.filter(AccessHistory::Column::IsSuspicious.eq(true));
        }
        if let Some(since) = filter.since {
            query = query.filter(AccessHistory::Column::CreatedAt.gte(since));
        }

        let per_page = filter.per_page.max(1);
        let db = self.db.lock().await;
        let paginator = query
            .order_by_desc(AccessHistory::Column::CreatedAt)
            .paginate(&*db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(filter.page).await?;

        Ok(HistoryPage {
            items,
            total,
            page: filter.page,
            per_page,
        })
    }

    /// Distinct addresses in the account's history over `window`
    pub async fn get_unique_ip_count(
        &self,
        account_id: Uuid,
        window: Duration,
    ) -> Result<u64, TollgateError> {
        let since = cutoff_before(window);
        let db = self.db.lock().await;
        Ok(AccessHistory::Entity::find()
            .select_only()
            .column(AccessHistory::Column::Ip)
            .distinct()
            .filter(AccessHistory::Column::AccountId.eq(account_id))
            .filter(AccessHistory::Column::CreatedAt.gte(since))
            .count(&*db)
            .await?)
    }

    /// Distinct addresses per country since `since`, largest first
    pub async fn get_ips_by_country(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<CountryCount>, TollgateError> {
        let pairs: Vec<(Option<String>, String)> = {
            let db = self.db.lock().await;
            AccessHistory::Entity::find()
                .select_only()
                .column(AccessHistory::Column::Country)
                .column(AccessHistory::Column::Ip)
                .distinct()
                .filter(AccessHistory::Column::AccountId.eq(account_id))
                .filter(AccessHistory::Column::CreatedAt.gte(since))
                .filter(AccessHistory::Column::Country.is_not_null())
                .into_tuple()
                .all(&*db)
                .await?
        };

        let mut counts = BTreeMap::<String, u64>::new();
        for (country, _) in pairs {
            if let Some(country) = country {
                *counts.entry(country).or_default() += 1;
            }
        }

        let mut result: Vec<_> = counts
            .into_iter()
            .map(|(country, ips)| CountryCount { country, ips })
            .collect();
        result.sort_by(|a, b| b.ips.cmp(&a.ips).then_with(|| a.country.cmp(&b.country)));
        Ok(result)
    }

    /// Distinct countries the account was seen from in the last `minutes`
    pub async fn get_recent_countries(
        &self,
        account_id: Uuid,
        minutes: i64,
    ) -> Result<Vec<String>, TollgateError> {
        let since = cutoff_before(Duration::try_minutes(minutes).unwrap_or(Duration::MAX));
        let db = self.db.lock().await;
        let countries: Vec<Option<String>> = AccessHistory::Entity::find()
            .select_only()
            .column(AccessHistory::Column::Country)
            .distinct()
            .filter(AccessHistory::Column::AccountId.eq(account_id))
            .filter(AccessHistory::Column::CreatedAt.gte(since))
            .filter(AccessHistory::Column::Country.is_not_null())
            .into_tuple()
            .all(&*db)
            .await?;
        Ok(countries.into_iter().flatten().collect())
    }

    pub async fn mark_suspicious(&self, history_id: Uuid) -> Result<(), TollgateError> {
        let db = self.db.lock().await;
        AccessHistory::Entity::update_many()
            .col_expr(AccessHistory::Column::IsSuspicious, Expr::value(true))
            .filter(AccessHistory::Column::Id.eq(history_id))
            .exec(&*db)
            .await?;
        Ok(())
    }

    pub async fn cleanup_old_history(&self, retention_days: u32) -> Result<u64, TollgateError> {
        let cutoff = cutoff_before(Duration::days(retention_days.into()));
        let db = self.db.lock().await;
        let result = AccessHistory::Entity::delete_many()
            .filter(AccessHistory::Column::CreatedAt.lt(cutoff))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }
}
