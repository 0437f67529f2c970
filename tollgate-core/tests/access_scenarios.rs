use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set,
};
use tokio::sync::Mutex;
use tollgate_common::{AccessCode, GeoIpConfig, RestrictionSettings, TollgateConfigStore};
use tollgate_core::geo::StaticGeoDatabase;
use tollgate_core::{
    AccessControlService, GeoReaderSlot, GeolocationCache, ListScope, NewListEntry,
};
use tollgate_db_entities::AccessHistory::AccessType;
use tollgate_db_entities::ActiveSession;
use tollgate_db_migrations::migrate_database;
use uuid::Uuid;

async fn connect_test_db() -> Arc<Mutex<DatabaseConnection>> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    migrate_database(&db).await.unwrap();
    Arc::new(Mutex::new(db))
}

struct Harness {
    db: Arc<Mutex<DatabaseConnection>>,
    service: AccessControlService,
}

async fn harness() -> Harness {
    let db = connect_test_db().await;
    let reader = Arc::new(GeoReaderSlot::with_database(Arc::new(
        StaticGeoDatabase::new()
            .with_country("1.0.1.1".parse().unwrap(), "CN", "China")
            .with_country("8.8.8.8".parse().unwrap(), "US", "United States")
            .with_country("81.2.69.142".parse().unwrap(), "GB", "United Kingdom"),
    )));
    let geo = Arc::new(GeolocationCache::new(
        db.clone(),
        reader,
        &GeoIpConfig::default(),
    ));
    let service = AccessControlService::new(db.clone(), geo, &TollgateConfigStore::default())
        .await
        .unwrap();
    Harness { db, service }
}

fn entry(value: &str, account_id: Option<Uuid>) -> NewListEntry {
    NewListEntry {
        value: value.to_owned(),
        account_id,
        reason: "scenario".to_owned(),
    }
}

/// Admits the address the way the surrounding service would: check, then record
async fn connect(service: &AccessControlService, account: Uuid, ip: &str) -> bool {
    let result = service
        .check_access(account, ip, AccessType::Connection, None)
        .await
        .unwrap();
    if result.allowed {
        service
            .record_activity(account, ip, "Mozilla/5.0", AccessType::Connection)
            .await
            .unwrap();
    }
    result.allowed
}

#[tokio::test]
async fn whitelist_wins_over_any_blacklist_entry() {
    let h = harness().await;
    let account = Uuid::new_v4();
    h.service.lists().add_blacklist(entry("10.1.0.0/16", None), None).await.unwrap();
    h.service
        .lists()
        .add_blacklist(entry("10.1.2.3", Some(account)), None)
        .await
        .unwrap();
    h.service.lists().add_whitelist(entry("10.1.2.0/24", None)).await.unwrap();

    for ip in ["10.1.2.3", "10.1.2.200"] {
        assert!(h.service.lists().is_whitelisted(ip, Some(account)).await.unwrap());
        let result = h
            .service
            .check_access(account, ip, AccessType::Connection, None)
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.reason, "whitelisted");
    }

    let result = h
        .service
        .check_access(account, "10.1.9.9", AccessType::Connection, None)
        .await
        .unwrap();
    assert_eq!(result.code, Some(AccessCode::IpBlacklisted));
}

#[tokio::test]
async fn expired_blacklist_entries_do_not_match() {
    let h = harness().await;
    h.service
        .lists()
        .add_blacklist(entry("7.7.7.7", None), Some(Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();
    assert!(!h.service.lists().is_blacklisted("7.7.7.7", None).await.unwrap());
    assert!(connect(&h.service, Uuid::new_v4(), "7.7.7.7").await);
}

#[tokio::test]
async fn limit_admits_first_addresses_and_keeps_them_sticky() {
    let h = harness().await;
    let account = Uuid::new_v4();
    let ips: Vec<String> = (1..=5).map(|i| format!("192.0.2.{i}")).collect();

    for ip in &ips[..3] {
        assert!(connect(&h.service, account, ip).await);
    }
    for ip in &ips[3..] {
        let result = h
            .service
            .check_access(account, ip, AccessType::Connection, None)
            .await
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(result.code, Some(AccessCode::IpLimitExceeded));
    }
    for ip in ips[..3].iter().rev() {
        let result = h
            .service
            .check_access(account, ip, AccessType::Connection, None)
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.reason, "existing session");
    }
}

#[tokio::test]
async fn limit_denial_lists_online_addresses() {
    let h = harness().await;
    let account = Uuid::new_v4();
    for ip in ["ip1", "ip2", "ip3"] {
        assert!(connect(&h.service, account, ip).await);
    }

    let result = h
        .service
        .check_access(account, "ip4", AccessType::Connection, Some(3))
        .await
        .unwrap();
    assert!(!result.allowed);
    assert_eq!(result.code, Some(AccessCode::IpLimitExceeded));
    let mut online = result.online_ips.clone();
    online.sort();
    assert_eq!(online, vec!["ip1", "ip2", "ip3"]);

    let result = h
        .service
        .check_access(account, "ip1", AccessType::Connection, Some(3))
        .await
        .unwrap();
    assert!(result.allowed);
    assert_eq!(result.reason, "existing session");
}

#[tokio::test]
async fn inactive_sessions_stop_counting() {
    let h = harness().await;
    let account = Uuid::new_v4();
    for ip in ["192.0.2.1", "192.0.2.2", "192.0.2.3"] {
        assert!(connect(&h.service, account, ip).await);
    }

    {
        let db = h.db.lock().await;
        let stale = ActiveSession::Entity::find()
            .filter(ActiveSession::Column::AccountId.eq(account))
            .filter(ActiveSession::Column::Ip.eq("192.0.2.1"))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        let mut stale = stale.into_active_model();
        stale.last_active = Set(Utc::now() - Duration::minutes(6));
        stale.update(&*db).await.unwrap();
    }

    assert!(connect(&h.service, account, "192.0.2.4").await);
    assert_eq!(
        h.service.sessions().get_active_session_count(account).await.unwrap(),
        3
    );
    assert!(!h
        .service
        .sessions()
        .is_session_active(account, "192.0.2.1")
        .await
        .unwrap());
}

#[tokio::test]
async fn threshold_failures_create_one_automatic_entry() {
    let h = harness().await;
    let threshold = RestrictionSettings::default().max_failed_attempts;
    for _ in 0..threshold {
        h.service
            .record_failed_attempt("203.0.113.9", "invalid subscription token")
            .await
            .unwrap();
    }

    assert!(h.service.check_auto_blacklist("203.0.113.9").await.unwrap());
    assert!(h.service.check_auto_blacklist("203.0.113.9").await.unwrap());

    let entries = h
        .service
        .lists()
        .list_blacklist(ListScope::All, false)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_automatic);
    assert_eq!(entries[0].ip.as_deref(), Some("203.0.113.9"));

    let result = h
        .service
        .check_access(Uuid::new_v4(), "203.0.113.9", AccessType::Subscription, None)
        .await
        .unwrap();
    assert_eq!(result.code, Some(AccessCode::IpBlacklisted));
}

#[tokio::test]
async fn blocked_country_is_denied_and_unknown_is_allowed() {
    let h = harness().await;
    h.service
        .save_settings(RestrictionSettings {
            geo_restriction_enabled: true,
            blocked_countries: vec!["CN".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    let account = Uuid::new_v4();

    let result = h
        .service
        .check_access(account, "1.0.1.1", AccessType::Connection, None)
        .await
        .unwrap();
    assert!(!result.allowed);
    assert_eq!(result.code, Some(AccessCode::GeoRestricted));

    assert!(connect(&h.service, account, "8.8.8.8").await);
    assert!(connect(&h.service, account, "81.2.69.142").await);
    assert!(connect(&h.service, account, "198.51.100.1").await);

    // Losing the database must not start denying
    h.service.geo().reader().close().await;
    assert!(connect(&h.service, account, "198.51.100.2").await);
}

#[tokio::test]
async fn subscription_limit_scenario() {
    let h = harness().await;
    let subscriptions = h.service.subscriptions();
    subscriptions.record_access("sub-token", "ipA", "Clash").await.unwrap();
    subscriptions.record_access("sub-token", "ipB", "Clash").await.unwrap();

    let result = subscriptions.check_ip_limit("sub-token", "ipC", 2).await.unwrap();
    assert!(!result.allowed);
    assert_eq!(result.code, Some(AccessCode::SubscriptionIpLimit));

    let result = subscriptions.check_ip_limit("sub-token", "ipA", 2).await.unwrap();
    assert!(result.allowed);
    assert_eq!(result.reason, "existing access");
}

#[tokio::test]
async fn import_distinguishes_cidr_and_plain_entries() {
    let h = harness().await;
    let report = h
        .service
        .lists()
        .import_blacklist(&["10.0.0.0/24", "1.2.3.4"], None, "import", None)
        .await
        .unwrap();
    assert_eq!(report.imported, 2);

    let entries = h
        .service
        .lists()
        .list_blacklist(ListScope::All, true)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .any(|e| e.cidr.as_deref() == Some("10.0.0.0/24") && e.ip.is_none()));
    assert!(entries
        .iter()
        .any(|e| e.ip.as_deref() == Some("1.2.3.4") && e.cidr.is_none()));
}

#[tokio::test]
async fn stats_report_usage() {
    let h = harness().await;
    let account = Uuid::new_v4();
    assert!(connect(&h.service, account, "8.8.8.8").await);
    assert!(connect(&h.service, account, "81.2.69.142").await);

    let stats = h.service.get_stats(account, None).await.unwrap();
    assert_eq!(stats.active_sessions, 2);
    assert_eq!(stats.unique_ips_30d, 2);
    assert_eq!(stats.max_concurrent, 3);
    assert_eq!(stats.remaining_slots, Some(1));
    assert_eq!(stats.countries.len(), 2);
    assert!(!stats.is_suspicious);
    assert_eq!(stats.recent_sessions.len(), 2);
}
