use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tollgate_common::{
    AccessCode, AccessResult, RestrictionSettings, TollgateConfigStore, TollgateError,
};
use tollgate_db_entities::AccessHistory::AccessType;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access_lists::{AccessListStore, NewListEntry};
use crate::consts::{
    cutoff_before, expiry_after, to_chrono_duration, RECENT_SESSIONS_LIMIT, SUSPICIOUS_COUNTRY_THRESHOLD,
    SUSPICIOUS_WINDOW_MINUTES, UNIQUE_IP_WINDOW_DAYS,
};
use crate::device::classify_user_agent;
use crate::failed_attempts::FailedAttemptLedger;
use crate::geo::{GeoInfo, GeolocationCache};
use crate::notifications::{dispatch, AccessEvent, AccessEventKind, Notifier};
use crate::sessions::{CountryCount, NewHistoryRecord, OnlineSession, SessionTracker, SessionUpdate};
use crate::settings::SettingsStore;
use crate::subscriptions::SubscriptionAccessLimiter;

/// Per-account usage report
#[derive(Clone, Debug, Serialize)]
pub struct IpStats {
    pub active_sessions: u64,
    pub unique_ips_30d: u64,
    pub countries: Vec<CountryCount>,
    pub recent_sessions: Vec<OnlineSession>,
    /// Zero means unlimited
    pub max_concurrent: u32,
    /// `None` when unlimited
    pub remaining_slots: Option<u32>,
    pub recent_countries: Vec<String>,
    pub is_suspicious: bool,
}

/// Rows removed by one maintenance pass
#[derive(Clone, Debug, Default, Serialize)]
pub struct MaintenanceStats {
    pub inactive_sessions_removed: u64,
    pub expired_blacklist_removed: u64,
    pub old_failed_attempts_removed: u64,
    pub old_history_removed: u64,
    pub expired_geo_cache_removed: u64,
}

impl MaintenanceStats {
    pub fn total(&self) -> u64 {
        self.inactive_sessions_removed
            + self.expired_blacklist_removed
            + self.old_failed_attempts_removed
            + self.old_history_removed
            + self.expired_geo_cache_removed
    }
}

/// Decides whether an access is admitted and keeps session state current
pub struct AccessControlService {
    settings: RwLock<RestrictionSettings>,
    settings_store: SettingsStore,
    lists: AccessListStore,
    sessions: SessionTracker,
    subscriptions: SubscriptionAccessLimiter,
    failed_attempts: FailedAttemptLedger,
    geo: Arc<GeolocationCache>,
    notifiers: Vec<Arc<dyn Notifier>>,
    log_decisions: bool,
    history_retention_days: u32,
}

impl AccessControlService {
    /// Loads the stored restriction settings once
    pub async fn new(
        db: Arc<Mutex<DatabaseConnection>>,
        geo: Arc<GeolocationCache>,
        config: &TollgateConfigStore,
    ) -> Result<Self, TollgateError> {
        let settings_store = SettingsStore::new(db.clone());
        let settings = settings_store.load().await?;

        Ok(Self {
            settings: RwLock::new(settings),
            settings_store,
            lists: AccessListStore::new(db.clone()),
            sessions: SessionTracker::new(db.clone()),
            subscriptions: SubscriptionAccessLimiter::new(db.clone(), geo.clone()),
            failed_attempts: FailedAttemptLedger::new(db),
            geo,
            notifiers: vec![],
            log_decisions: config.log.log_decisions,
            history_retention_days: config.maintenance.history_retention_days,
        })
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn lists(&self) -> &AccessListStore {
        &self.lists
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn subscriptions(&self) -> &SubscriptionAccessLimiter {
        &self.subscriptions
    }

    pub fn geo(&self) -> &Arc<GeolocationCache> {
        &self.geo
    }

    pub async fn settings(&self) -> RestrictionSettings {
        self.settings.read().await.clone()
    }

    pub async fn reload_settings(&self) -> Result<RestrictionSettings, TollgateError> {
        let settings = self.settings_store.load().await?;
        *self.settings.write().await = settings.clone();
        info!("Restriction settings reloaded");
        Ok(settings)
    }

    /// Persists first, so a failed write leaves the running policy unchanged
    pub async fn save_settings(&self, settings: RestrictionSettings) -> Result<(), TollgateError> {
        self.settings_store.save(&settings).await?;
        *self.settings.write().await = settings;
        info!("Restriction settings saved");
        Ok(())
    }

    /// A failed lookup leaves the location out
    async fn locate(&self, ip: &str) -> Option<GeoInfo> {
        match self.geo.lookup(ip).await {
            Ok(geo) => Some(geo),
            Err(error) => {
                debug!(ip = %ip, %error, "No location for event");
                None
            }
        }
    }

    fn log_decision(
        &self,
        account_id: Uuid,
        ip: &str,
        access_type: AccessType,
        result: &AccessResult,
    ) {
        if self.log_decisions {
            info!(
                account_id = %account_id,
                ip = %ip,
                ?access_type,
                allowed = result.allowed,
                code = ?result.code,
                reason = %result.reason,
                "Access decision"
            );
        } else {
            debug!(
                account_id = %account_id,
                ip = %ip,
                ?access_type,
                allowed = result.allowed,
                code = ?result.code,
                "Access decision"
            );
        }
    }

    /// Runs the admission pipeline. The order of the checks is part of the contract:
    /// whitelist, blacklist, country, then the concurrency limit.
    pub async fn check_access(
        &self,
        account_id: Uuid,
        ip: &str,
        access_type: AccessType,
        max_concurrent: Option<u32>,
    ) -> Result<AccessResult, TollgateError> {
        let result = self
            .evaluate_access(account_id, ip, max_concurrent)
            .await?;
        self.log_decision(account_id, ip, access_type, &result);
        Ok(result)
    }

    async fn evaluate_access(
        &self,
        account_id: Uuid,
        ip: &str,
        max_concurrent: Option<u32>,
    ) -> Result<AccessResult, TollgateError> {
        let settings = self.settings().await;

        if !settings.enabled {
            return Ok(AccessResult::allow("restriction disabled"));
        }

        if self.lists.is_whitelisted(ip, Some(account_id)).await? {
            return Ok(AccessResult::allow("whitelisted"));
        }

        if let Some(entry) = self.lists.find_blacklist_match(ip, Some(account_id)).await? {
            return Ok(AccessResult::deny(
                AccessCode::IpBlacklisted,
                format!("IP is blacklisted: {}", entry.reason),
            ));
        }

        if settings.geo_restriction_enabled {
            let restriction = self
                .geo
                .check_geo_restriction(ip, &settings.allowed_countries, &settings.blocked_countries)
                .await;
            if !restriction.allowed {
                return Ok(AccessResult::deny(
                    AccessCode::GeoRestricted,
                    format!(
                        "access from {} is not allowed",
                        restriction.country_code.as_deref().unwrap_or("this country")
                    ),
                ));
            }
        }

        let limit = max_concurrent.unwrap_or(settings.default_max_concurrent_sessions);
        if limit == 0 {
            return Ok(AccessResult::allow("unlimited"));
        }

        let timeout = to_chrono_duration(settings.inactivity_timeout);
        self.sessions
            .cleanup_inactive_sessions_for_account(account_id, timeout)
            .await?;

        if self.sessions.update_last_active(account_id, ip).await? {
            return Ok(AccessResult::allow("existing session"));
        }

        // Not atomic with the later upsert: concurrent new addresses may both pass
        let count = self.sessions.get_active_session_count(account_id).await?;
        if count >= u64::from(limit) {
            let online_ips: Vec<String> = self
                .sessions
                .get_online_sessions(account_id, timeout)
                .await?
                .into_iter()
                .map(|s| s.ip)
                .collect();

            let mut event =
                AccessEvent::new(AccessEventKind::IpLimitReached, Some(account_id), ip)
                    .with_count(count, Some(limit.into()))
                    .with_reason(format!("{count} of {limit} devices online"));
            if let Some(geo) = self.locate(ip).await {
                event = event.with_geo(&geo);
            }
            dispatch(&self.notifiers, event);

            return Ok(AccessResult::deny(
                AccessCode::IpLimitExceeded,
                format!("concurrent device limit reached ({count}/{limit})"),
            )
            .with_online_ips(online_ips));
        }

        let remaining = u64::from(limit).saturating_sub(count + 1);
        Ok(AccessResult::allow("within limit")
            .with_remaining_slots(u32::try_from(remaining).unwrap_or(u32::MAX)))
    }

    /// Records an accepted access: session upsert, history, anomaly notifications
    pub async fn record_activity(
        &self,
        account_id: Uuid,
        ip: &str,
        user_agent: &str,
        access_type: AccessType,
    ) -> Result<(), TollgateError> {
        let geo = match self.geo.lookup(ip).await {
            Ok(geo) => geo,
            Err(error) => {
                debug!(ip = %ip, %error, "Recording activity without location");
                GeoInfo::default()
            }
        };
        let device_type = classify_user_agent(user_agent);
        let timeout = to_chrono_duration(self.settings().await.inactivity_timeout);
        self.sessions
            .cleanup_inactive_sessions_for_account(account_id, timeout)
            .await?;
        let is_new_device = !self.sessions.is_session_active(account_id, ip).await?;

        self.sessions
            .add_active_session(SessionUpdate {
                account_id,
                ip: ip.to_owned(),
                user_agent: user_agent.to_owned(),
                device_type,
                country: geo.country_code.clone(),
                city: geo.city.clone(),
            })
            .await?;

        let mut countries: BTreeSet<String> = self
            .sessions
            .get_recent_countries(account_id, SUSPICIOUS_WINDOW_MINUTES)
            .await?
            .into_iter()
            .collect();
        if let Some(country) = &geo.country_code {
            countries.insert(country.clone());
        }
        let is_suspicious = countries.len() > SUSPICIOUS_COUNTRY_THRESHOLD;

        self.sessions
            .record_history(NewHistoryRecord {
                account_id,
                ip: ip.to_owned(),
                user_agent: user_agent.to_owned(),
                access_type,
                country: geo.country_code.clone(),
                city: geo.city.clone(),
                is_suspicious,
            })
            .await?;

        if is_new_device {
            info!(account_id = %account_id, ip = %ip, ?device_type, "New device");
            dispatch(
                &self.notifiers,
                AccessEvent::new(AccessEventKind::NewDevice, Some(account_id), ip)
                    .with_geo(&geo)
                    .with_device(device_type, user_agent),
            );
        }

        if is_suspicious {
            warn!(
                account_id = %account_id,
                ip = %ip,
                countries = ?countries,
                "Access from too many countries"
            );
            dispatch(
                &self.notifiers,
                AccessEvent::new(AccessEventKind::SuspiciousActivity, Some(account_id), ip)
                    .with_geo(&geo)
                    .with_device(device_type, user_agent)
                    .with_count(countries.len() as u64, None)
                    .with_reason(format!(
                        "seen from {} countries in {SUSPICIOUS_WINDOW_MINUTES} minutes",
                        countries.len()
                    )),
            );
        }

        Ok(())
    }

    /// Sessions within the inactivity timeout
    pub async fn get_online_sessions(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<OnlineSession>, TollgateError> {
        let timeout = to_chrono_duration(self.settings().await.inactivity_timeout);
        self.sessions.get_online_sessions(account_id, timeout).await
    }

    pub async fn heartbeat(&self, account_id: Uuid, ip: &str) -> Result<bool, TollgateError> {
        self.sessions.update_last_active(account_id, ip).await
    }

    /// Drops the session and optionally bars the address from the account for a while.
    /// `block_duration` defaults to the auto-blacklist duration.
    pub async fn kick_session(
        &self,
        account_id: Uuid,
        ip: &str,
        add_to_blacklist: bool,
        block_duration: Option<Duration>,
    ) -> Result<(), TollgateError> {
        let kick_failed = || TollgateError::KickFailed {
            account_id,
            ip: ip.to_owned(),
        };
        let session = self
            .sessions
            .get_session(account_id, ip)
            .await?
            .ok_or_else(kick_failed)?;
        let expires_at = if add_to_blacklist {
            let duration =
                block_duration.unwrap_or(self.settings().await.auto_blacklist_duration);
            Some(expiry_after(duration)?)
        } else {
            None
        };

        if self.sessions.remove_active_session(account_id, ip).await? == 0 {
            return Err(kick_failed());
        }

        let mut event = AccessEvent::new(AccessEventKind::DeviceKicked, Some(account_id), ip)
            .with_session(&session);

        if let Some(expires_at) = expires_at {
            self.lists
                .add_blacklist(
                    NewListEntry {
                        value: ip.to_owned(),
                        account_id: Some(account_id),
                        reason: "kicked".to_owned(),
                    },
                    Some(expires_at),
                )
                .await?;
            event = event.with_reason(format!("blocked until {expires_at}"));
        }

        info!(account_id = %account_id, ip = %ip, add_to_blacklist, "Session kicked");
        dispatch(&self.notifiers, event);
        Ok(())
    }

    pub async fn get_stats(
        &self,
        account_id: Uuid,
        max_concurrent: Option<u32>,
    ) -> Result<IpStats, TollgateError> {
        let settings = self.settings().await;
        let timeout = to_chrono_duration(settings.inactivity_timeout);
        self.sessions
            .cleanup_inactive_sessions_for_account(account_id, timeout)
            .await?;

        let window = chrono::Duration::days(UNIQUE_IP_WINDOW_DAYS);
        let active_sessions = self.sessions.get_active_session_count(account_id).await?;
        let unique_ips_30d = self.sessions.get_unique_ip_count(account_id, window).await?;
        let countries = self
            .sessions
            .get_ips_by_country(account_id, cutoff_before(window))
            .await?;
        let recent_sessions = self
            .sessions
            .get_active_sessions(account_id)
            .await?
            .into_iter()
            .take(RECENT_SESSIONS_LIMIT)
            .map(Into::into)
            .collect();
        let recent_countries = self
            .sessions
            .get_recent_countries(account_id, SUSPICIOUS_WINDOW_MINUTES)
            .await?;

        let max_concurrent = max_concurrent.unwrap_or(settings.default_max_concurrent_sessions);
        let remaining_slots = (max_concurrent > 0).then(|| {
            let remaining = u64::from(max_concurrent).saturating_sub(active_sessions);
            u32::try_from(remaining).unwrap_or(u32::MAX)
        });

        Ok(IpStats {
            active_sessions,
            unique_ips_30d,
            countries,
            recent_sessions,
            max_concurrent,
            remaining_slots,
            is_suspicious: recent_countries.len() > SUSPICIOUS_COUNTRY_THRESHOLD,
            recent_countries,
        })
    }

    pub async fn record_failed_attempt(&self, ip: &str, reason: &str) -> Result<(), TollgateError> {
        self.failed_attempts.record(ip, reason).await
    }

    /// Blacklists `ip` globally once its failures in the window reach the threshold.
    /// Returns whether the address is now auto-blacklisted.
    pub async fn check_auto_blacklist(&self, ip: &str) -> Result<bool, TollgateError> {
        let settings = self.settings().await;
        if !settings.auto_blacklist_enabled || settings.max_failed_attempts == 0 {
            return Ok(false);
        }

        let count = self
            .failed_attempts
            .count_in_window(ip, to_chrono_duration(settings.failed_attempt_window))
            .await?;
        if count < u64::from(settings.max_failed_attempts) {
            return Ok(false);
        }

        if self.lists.find_automatic_blacklist(ip).await?.is_some() {
            debug!(ip = %ip, "Already auto-blacklisted");
            return Ok(true);
        }

        let expires_at = expiry_after(settings.auto_blacklist_duration)?;
        let reason = format!("{count} failed attempts");
        self.lists
            .add_automatic_blacklist(ip, reason.clone(), expires_at)
            .await?;

        warn!(ip = %ip, count, expires_at = %expires_at, "IP auto-blacklisted");
        let mut event = AccessEvent::new(AccessEventKind::AutoBlacklisted, None, ip)
            .with_count(count, Some(settings.max_failed_attempts.into()))
            .with_reason(reason);
        if let Some(geo) = self.locate(ip).await {
            event = event.with_geo(&geo);
        }
        dispatch(&self.notifiers, event);
        Ok(true)
    }

    /// Lifts global exact-IP blacklist entries and forgets the address's failures
    pub async fn unblock_ip(&self, ip: &str) -> Result<u64, TollgateError> {
        let removed = self.lists.remove_blacklist_ip(ip, None).await?;
        let attempts = self.failed_attempts.delete_for_ip(ip).await?;
        info!(ip = %ip, removed, attempts, "IP unblocked");
        Ok(removed)
    }

    /// One pass of every sweep. Safe to run concurrently with itself.
    pub async fn run_maintenance(&self) -> Result<MaintenanceStats, TollgateError> {
        let settings = self.settings().await;
        let stats = MaintenanceStats {
            inactive_sessions_removed: self
                .sessions
                .cleanup_inactive_sessions(to_chrono_duration(settings.inactivity_timeout))
                .await?,
            expired_blacklist_removed: self.lists.cleanup_expired_blacklist().await?,
            old_failed_attempts_removed: self
                .failed_attempts
                .cleanup(to_chrono_duration(settings.failed_attempt_window))
                .await?,
            old_history_removed: self
                .sessions
                .cleanup_old_history(self.history_retention_days)
                .await?,
            expired_geo_cache_removed: self.geo.cleanup_expired().await?,
        };
        Ok(stats)
    }
}
