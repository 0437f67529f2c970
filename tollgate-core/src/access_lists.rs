use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tollgate_common::TollgateError;
use tollgate_db_entities::{AccessBlacklist, AccessWhitelist};
use tracing::{debug, info};
use uuid::Uuid;

use crate::matcher::{canonical_ip, is_valid_cidr, matches_cidr, matches_ip};

/// Which entries a listing returns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListScope {
    All,
    Global,
    Account(Uuid),
}

#[derive(Clone, Debug)]
pub struct NewListEntry {
    /// Plain IP address or CIDR range
    pub value: String,
    pub account_id: Option<Uuid>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<String>,
}

enum EntryAddress {
    Ip(String),
    Cidr(String),
}

impl EntryAddress {
    fn parse(value: &str) -> Result<Self, TollgateError> {
        let value = value.trim();
        if is_valid_cidr(value) {
            return Ok(Self::Cidr(value.to_owned()));
        }
        canonical_ip(value)
            .map(Self::Ip)
            .ok_or_else(|| TollgateError::InvalidCidr(value.to_owned()))
    }

    fn into_columns(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Ip(ip) => (Some(ip), None),
            Self::Cidr(cidr) => (None, Some(cidr)),
        }
    }
}

fn entry_matches(ip: &str, entry_ip: Option<&str>, entry_cidr: Option<&str>) -> bool {
    entry_ip.is_some_and(|candidate| matches_ip(ip, candidate))
        || entry_cidr.is_some_and(|cidr| matches_cidr(ip, cidr))
}

/// Global entries plus, if given, the account's own entries
fn scope_condition<C: ColumnTrait>(account_column: C, account_id: Option<Uuid>) -> Condition {
    match account_id {
        Some(account_id) => Condition::any()
            .add(account_column.is_null())
            .add(account_column.eq(account_id)),
        None => Condition::all().add(account_column.is_null()),
    }
}

fn listing_condition<C: ColumnTrait>(account_column: C, scope: ListScope) -> Condition {
    match scope {
        ListScope::All => Condition::all(),
        ListScope::Global => Condition::all().add(account_column.is_null()),
        ListScope::Account(account_id) => Condition::all().add(account_column.eq(account_id)),
    }
}

/// Whitelist and blacklist persistence and evaluation
pub struct AccessListStore {
    db: Arc<Mutex<DatabaseConnection>>,
}

impl AccessListStore {
    pub fn new(db: Arc<Mutex<DatabaseConnection>>) -> Self {
        Self { db }
    }

    pub async fn find_whitelist_match(
        &self,
        ip: &str,
        account_id: Option<Uuid>,
    ) -> Result<Option<AccessWhitelist::Model>, TollgateError> {
        let db = self.db.lock().await;
        let entries = AccessWhitelist::Entity::find()
            .filter(scope_condition(AccessWhitelist::Column::AccountId, account_id))
            .all(&*db)
            .await?;

        Ok(entries
            .into_iter()
            .find(|e| entry_matches(ip, e.ip.as_deref(), e.cidr.as_deref())))
    }

    pub async fn is_whitelisted(
        &self,
        ip: &str,
        account_id: Option<Uuid>,
    ) -> Result<bool, TollgateError> {
        Ok(self.find_whitelist_match(ip, account_id).await?.is_some())
    }

    /// Only entries that have not expired are considered
    pub async fn find_blacklist_match(
        &self,
        ip: &str,
        account_id: Option<Uuid>,
    ) -> Result<Option<AccessBlacklist::Model>, TollgateError> {
        let now = Utc::now();
        let db = self.db.lock().await;
        let entries = AccessBlacklist::Entity::find()
            .filter(scope_condition(AccessBlacklist::Column::AccountId, account_id))
            .filter(
                Condition::any()
                    .add(AccessBlacklist::Column::ExpiresAt.is_null())
                    .add(AccessBlacklist::Column::ExpiresAt.gt(now)),
            )
            .all(&*db)
            .await?;

        Ok(entries
            .into_iter()
            .find(|e| entry_matches(ip, e.ip.as_deref(), e.cidr.as_deref())))
    }

    /// Active automatic entry for exactly this address
    pub async fn find_automatic_blacklist(
        &self,
        ip: &str,
    ) -> Result<Option<AccessBlacklist::Model>, TollgateError> {
        let ip = canonical_ip(ip).unwrap_or_else(|| ip.to_owned());
        let now = Utc::now();
        let db = self.db.lock().await;
        Ok(AccessBlacklist::Entity::find()
            .filter(AccessBlacklist::Column::AccountId.is_null())
            .filter(AccessBlacklist::Column::IsAutomatic.eq(true))
            .filter(AccessBlacklist::Column::Ip.eq(ip))
            .filter(
                Condition::any()
                    .add(AccessBlacklist::Column::ExpiresAt.is_null())
                    .add(AccessBlacklist::Column::ExpiresAt.gt(now)),
            )
            .one(&*db)
            .await?)
    }

    pub async fn is_blacklisted(
        &self,
        ip: &str,
        account_id: Option<Uuid>,
    ) -> Result<bool, TollgateError> {
        Ok(self.find_blacklist_match(ip, account_id).await?.is_some())
    }

    pub async fn add_whitelist(
        &self,
        entry: NewListEntry,
    ) -> Result<AccessWhitelist::Model, TollgateError> {
        let (ip, cidr) = EntryAddress::parse(&entry.value)?.into_columns();
        let db = self.db.lock().await;
        let model = AccessWhitelist::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip: Set(ip),
            cidr: Set(cidr),
            account_id: Set(entry.account_id),
            reason: Set(entry.reason),
            created_at: Set(Utc::now()),
        }
        .insert(&*db)
        .await?;
        info!(value = %entry.value.trim(), account_id = ?entry.account_id, "Whitelist entry added");
        Ok(model)
    }

    pub async fn add_blacklist(
        &self,
        entry: NewListEntry,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<AccessBlacklist::Model, TollgateError> {
        self.insert_blacklist(&entry.value, entry.account_id, entry.reason, expires_at, false)
            .await
    }

    /// Global entry created by the failed-attempt trigger
    pub async fn add_automatic_blacklist(
        &self,
        ip: &str,
        reason: String,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessBlacklist::Model, TollgateError> {
        self.insert_blacklist(ip, None, reason, Some(expires_at), true)
            .await
    }

    async fn insert_blacklist(
        &self,
        value: &str,
        account_id: Option<Uuid>,
        reason: String,
        expires_at: Option<DateTime<Utc>>,
        is_automatic: bool,
    ) -> Result<AccessBlacklist::Model, TollgateError> {
        let (ip, cidr) = EntryAddress::parse(value)?.into_columns();
        let db = self.db.lock().await;
        let model = AccessBlacklist::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip: Set(ip),
            cidr: Set(cidr),
            account_id: Set(account_id),
            reason: Set(reason),
            expires_at: Set(expires_at),
            is_automatic: Set(is_automatic),
            created_at: Set(Utc::now()),
        }
        .insert(&*db)
        .await?;
        info!(
            value = %value.trim(),
            account_id = ?account_id,
            expires_at = ?expires_at,
            is_automatic,
            "Blacklist entry added"
        );
        Ok(model)
    }

    pub async fn remove_whitelist(&self, id: Uuid) -> Result<(), TollgateError> {
        let db = self.db.lock().await;
        let result = AccessWhitelist::Entity::delete_by_id(id).exec(&*db).await?;
        if result.rows_affected == 0 {
            return Err(TollgateError::ListEntryNotFound(id));
        }
        Ok(())
    }

    pub async fn remove_blacklist(&self, id: Uuid) -> Result<(), TollgateError> {
        let db = self.db.lock().await;
        let result = AccessBlacklist::Entity::delete_by_id(id).exec(&*db).await?;
        if result.rows_affected == 0 {
            return Err(TollgateError::ListEntryNotFound(id));
        }
        Ok(())
    }

    /// Deletes exact-IP blacklist entries in one scope
    pub async fn remove_blacklist_ip(
        &self,
        ip: &str,
        account_id: Option<Uuid>,
    ) -> Result<u64, TollgateError> {
        let ip = canonical_ip(ip).unwrap_or_else(|| ip.to_owned());
        let db = self.db.lock().await;
        let account_filter = match account_id {
            Some(account_id) => AccessBlacklist::Column::AccountId.eq(account_id),
            None => AccessBlacklist::Column::AccountId.is_null(),
        };
        let result = AccessBlacklist::Entity::delete_many()
            .filter(AccessBlacklist::Column::Ip.eq(ip))
            .filter(account_filter)
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn list_whitelist(
        &self,
        scope: ListScope,
    ) -> Result<Vec<AccessWhitelist::Model>, TollgateError> {
        let db = self.db.lock().await;
        Ok(AccessWhitelist::Entity::find()
            .filter(listing_condition(AccessWhitelist::Column::AccountId, scope))
            .order_by_desc(AccessWhitelist::Column::CreatedAt)
            .all(&*db)
            .await?)
    }

    pub async fn list_blacklist(
        &self,
        scope: ListScope,
        include_expired: bool,
    ) -> Result<Vec<AccessBlacklist::Model>, TollgateError> {
        let now = Utc::now();
        let db = self.db.lock().await;
        let entries = AccessBlacklist::Entity::find()
            .filter(listing_condition(AccessBlacklist::Column::AccountId, scope))
            .order_by_desc(AccessBlacklist::Column::CreatedAt)
            .all(&*db)
            .await?;
        Ok(entries
            .into_iter()
            .filter(|e| include_expired || e.is_active_at(now))
            .collect())
    }

    /// Adds every valid token, skipping and reporting the rest
    pub async fn import_whitelist<S: AsRef<str>>(
        &self,
        values: &[S],
        account_id: Option<Uuid>,
        reason: &str,
    ) -> Result<ImportReport, TollgateError> {
        let mut report = ImportReport::default();
        for value in nonempty_tokens(values) {
            let entry = NewListEntry {
                value: value.to_owned(),
                account_id,
                reason: reason.to_owned(),
            };
            match self.add_whitelist(entry).await {
                Ok(_) => report.imported += 1,
                Err(TollgateError::InvalidCidr(value)) => report.skipped.push(value),
                Err(e) => return Err(e),
            }
        }
        debug!(imported = report.imported, skipped = report.skipped.len(), "Whitelist import done");
        Ok(report)
    }

    pub async fn import_blacklist<S: AsRef<str>>(
        &self,
        values: &[S],
        account_id: Option<Uuid>,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ImportReport, TollgateError> {
        let mut report = ImportReport::default();
        for value in nonempty_tokens(values) {
            match self
                .insert_blacklist(value, account_id, reason.to_owned(), expires_at, false)
                .await
            {
                Ok(_) => report.imported += 1,
                Err(TollgateError::InvalidCidr(value)) => report.skipped.push(value),
                Err(e) => return Err(e),
            }
        }
        debug!(imported = report.imported, skipped = report.skipped.len(), "Blacklist import done");
        Ok(report)
    }

    /// Idempotent sweep of expired blacklist rows
    pub async fn cleanup_expired_blacklist(&self) -> Result<u64, TollgateError> {
        let db = self.db.lock().await;
        let result = AccessBlacklist::Entity::delete_many()
            .filter(AccessBlacklist::Column::ExpiresAt.is_not_null())
            .filter(AccessBlacklist::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }
}

fn nonempty_tokens<S: AsRef<str>>(values: &[S]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty() && !v.starts_with('#'))
}
