use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tollgate_common::{AccessCode, AccessResult, TollgateError};
use tollgate_db_entities::SubscriptionAccess;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::consts::RECENT_SUBSCRIPTION_IPS_LIMIT;
use crate::geo::GeolocationCache;
use crate::sessions::CountryCount;

#[derive(Clone, Debug, Serialize)]
pub struct SubscriptionStats {
    pub unique_ips: u64,
    pub total_accesses: i64,
    pub countries: Vec<CountryCount>,
    /// Most recently seen first
    pub recent_ips: Vec<String>,
}

/// Caps how many distinct addresses may fetch one subscription link
pub struct SubscriptionAccessLimiter {
    db: Arc<Mutex<DatabaseConnection>>,
    geo: Arc<GeolocationCache>,
}

impl SubscriptionAccessLimiter {
    pub fn new(db: Arc<Mutex<DatabaseConnection>>, geo: Arc<GeolocationCache>) -> Self {
        Self { db, geo }
    }

    async fn find(
        &self,
        token: &str,
        ip: &str,
    ) -> Result<Option<SubscriptionAccess::Model>, TollgateError> {
        let db = self.db.lock().await;
        Ok(SubscriptionAccess::Entity::find()
            .filter(SubscriptionAccess::Column::SubscriptionToken.eq(token))
            .filter(SubscriptionAccess::Column::Ip.eq(ip))
            .one(&*db)
            .await?)
    }

    /// Counts one fetch of `token` from `ip`. The country is resolved only the first time.
    pub async fn record_access(
        &self,
        token: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<(), TollgateError> {
        let country = if self.find(token, ip).await?.is_none() {
            match self.geo.lookup(ip).await {
                Ok(info) => info.country_code,
                Err(error) => {
                    debug!(ip = %ip, %error, "No country for subscription access");
                    None
                }
            }
        } else {
            None
        };

        let now = Utc::now();
        let db = self.db.lock().await;
        SubscriptionAccess::Entity::insert(SubscriptionAccess::ActiveModel {
            id: Set(Uuid::new_v4()),
            subscription_token: Set(token.to_owned()),
            ip: Set(ip.to_owned()),
            user_agent: Set(user_agent.to_owned()),
            country: Set(country),
            access_count: Set(1),
            first_access: Set(now),
            last_access: Set(now),
        })
        .on_conflict(
            OnConflict::columns([
                SubscriptionAccess::Column::SubscriptionToken,
                SubscriptionAccess::Column::Ip,
            ])
            .update_columns([
                SubscriptionAccess::Column::UserAgent,
                SubscriptionAccess::Column::LastAccess,
            ])
            .value(
                SubscriptionAccess::Column::AccessCount,
                Expr::col((
                    SubscriptionAccess::Entity,
                    SubscriptionAccess::Column::AccessCount,
                ))
                .add(1),
            )
            .to_owned(),
        )
        .exec_without_returning(&*db)
        .await?;
        Ok(())
    }

    /// A non-positive limit disables the check
    pub async fn check_ip_limit(
        &self,
        token: &str,
        ip: &str,
        limit: i64,
    ) -> Result<AccessResult, TollgateError> {
        if limit <= 0 {
            return Ok(AccessResult::allow("unlimited"));
        }

        if self.find(token, ip).await?.is_some() {
            return Ok(AccessResult::allow("existing access"));
        }

        let count = {
            let db = self.db.lock().await;
            SubscriptionAccess::Entity::find()
                .filter(SubscriptionAccess::Column::SubscriptionToken.eq(token))
                .count(&*db)
                .await?
        };
        let count = i64::try_from(count).unwrap_or(i64::MAX);

        if count >= limit {
            warn!(ip = %ip, count, limit, "Subscription IP limit reached");
            return Ok(AccessResult::deny(
                AccessCode::SubscriptionIpLimit,
                format!("subscription already used from {count} of {limit} allowed addresses"),
            ));
        }

        let remaining = u32::try_from(limit - count - 1).unwrap_or(u32::MAX);
        Ok(AccessResult::allow("within limit").with_remaining_slots(remaining))
    }

    /// Most recent first
    pub async fn get_access_list(
        &self,
        token: &str,
    ) -> Result<Vec<SubscriptionAccess::Model>, TollgateError> {
        let db = self.db.lock().await;
        Ok(SubscriptionAccess::Entity::find()
            .filter(SubscriptionAccess::Column::SubscriptionToken.eq(token))
            .order_by_desc(SubscriptionAccess::Column::LastAccess)
            .all(&*db)
            .await?)
    }

    /// Resets the token's grants, e.g. after the link is regenerated
    pub async fn clear_access_list(&self, token: &str) -> Result<u64, TollgateError> {
        let db = self.db.lock().await;
        let result = SubscriptionAccess::Entity::delete_many()
            .filter(SubscriptionAccess::Column::SubscriptionToken.eq(token))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn remove_ip(&self, token: &str, ip: &str) -> Result<u64, TollgateError> {
        let db = self.db.lock().await;
        let result = SubscriptionAccess::Entity::delete_many()
            .filter(SubscriptionAccess::Column::SubscriptionToken.eq(token))
            .filter(SubscriptionAccess::Column::Ip.eq(ip))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn get_access_stats(&self, token: &str) -> Result<SubscriptionStats, TollgateError> {
        let accesses = self.get_access_list(token).await?;

        let mut countries = BTreeMap::<String, u64>::new();
        for access in &accesses {
            if let Some(country) = &access.country {
                *countries.entry(country.clone()).or_default() += 1;
            }
        }
        let mut countries: Vec<_> = countries
            .into_iter()
            .map(|(country, ips)| CountryCount { country, ips })
            .collect();
        countries.sort_by(|a, b| b.ips.cmp(&a.ips).then_with(|| a.country.cmp(&b.country)));

        Ok(SubscriptionStats {
            unique_ips: accesses.len() as u64,
            total_accesses: accesses.iter().map(|a| a.access_count).sum(),
            countries,
            recent_ips: accesses
                .iter()
                .take(RECENT_SUBSCRIPTION_IPS_LIMIT)
                .map(|a| a.ip.clone())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tollgate_common::GeoIpConfig;

    use super::*;
    use crate::geo::{GeoReaderSlot, StaticGeoDatabase};
    use crate::test_support::connect_test_db;

    async fn limiter() -> SubscriptionAccessLimiter {
        let db = connect_test_db().await;
        let reader = Arc::new(GeoReaderSlot::with_database(Arc::new(
            StaticGeoDatabase::new()
                .with_country("1.1.1.1".parse().unwrap(), "AU", "Australia")
                .with_country("2.2.2.2".parse().unwrap(), "AU", "Australia"),
        )));
        let geo = Arc::new(GeolocationCache::new(
            db.clone(),
            reader,
            &GeoIpConfig::default(),
        ));
        SubscriptionAccessLimiter::new(db, geo)
    }

    #[tokio::test]
    async fn test_limit_with_sticky_grants() {
        let limiter = limiter().await;
        limiter.record_access("tok", "1.1.1.1", "clash").await.unwrap();
        limiter.record_access("tok", "2.2.2.2", "clash").await.unwrap();

        let result = limiter.check_ip_limit("tok", "3.3.3.3", 2).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.code, Some(AccessCode::SubscriptionIpLimit));

        let result = limiter.check_ip_limit("tok", "1.1.1.1", 2).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.reason, "existing access");

        assert!(limiter.check_ip_limit("tok", "3.3.3.3", 0).await.unwrap().allowed);
        assert!(limiter.check_ip_limit("other", "3.3.3.3", 2).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_remaining_slots() {
        let limiter = limiter().await;
        limiter.record_access("tok", "1.1.1.1", "").await.unwrap();
        let result = limiter.check_ip_limit("tok", "2.2.2.2", 3).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining_slots, Some(1));
    }

    #[tokio::test]
    async fn test_repeat_access_increments_count() {
        let limiter = limiter().await;
        for _ in 0..3 {
            limiter.record_access("tok", "1.1.1.1", "sing-box").await.unwrap();
        }
        limiter.record_access("tok", "2.2.2.2", "sing-box").await.unwrap();
        limiter.record_access("tok", "9.9.9.9", "sing-box").await.unwrap();

        let list = limiter.get_access_list("tok").await.unwrap();
        assert_eq!(list.len(), 3);
        let first = list.iter().find(|a| a.ip == "1.1.1.1").unwrap();
        assert_eq!(first.access_count, 3);
        assert_eq!(first.country.as_deref(), Some("AU"));

        let stats = limiter.get_access_stats("tok").await.unwrap();
        assert_eq!(stats.unique_ips, 3);
        assert_eq!(stats.total_accesses, 5);
        assert_eq!(
            stats.countries,
            vec![CountryCount { country: "AU".into(), ips: 2 }]
        );
        assert_eq!(stats.recent_ips.len(), 3);
    }

    #[tokio::test]
    async fn test_removal_frees_slots() {
        let limiter = limiter().await;
        limiter.record_access("tok", "1.1.1.1", "").await.unwrap();
        limiter.record_access("tok", "2.2.2.2", "").await.unwrap();
        assert_eq!(limiter.remove_ip("tok", "2.2.2.2").await.unwrap(), 1);
        assert!(limiter.check_ip_limit("tok", "3.3.3.3", 2).await.unwrap().allowed);

        assert_eq!(limiter.clear_access_list("tok").await.unwrap(), 1);
        assert!(limiter.get_access_list("tok").await.unwrap().is_empty());
    }
}
