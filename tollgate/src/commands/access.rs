use std::time::Duration;

use anyhow::Result;
use tollgate_core::is_valid_ip;
use tollgate_db_entities::AccessHistory::AccessType;
use tracing::*;
use uuid::Uuid;

use super::common::{print_json, services};

fn warn_if_not_an_address(ip: &str) {
    if !is_valid_ip(ip) {
        warn!(ip = %ip, "Not a valid IP address, list and geo checks will not match it");
    }
}

pub(crate) async fn check_access(
    cli: &crate::Cli,
    account: Uuid,
    ip: &str,
    access_type: AccessType,
    max_concurrent: Option<u32>,
) -> Result<()> {
    warn_if_not_an_address(ip);
    let services = services(cli).await?;
    let result = services
        .access_control
        .check_access(account, ip, access_type, max_concurrent)
        .await?;
    print_json(&result)
}

pub(crate) async fn record_activity(
    cli: &crate::Cli,
    account: Uuid,
    ip: &str,
    user_agent: &str,
    access_type: AccessType,
) -> Result<()> {
    warn_if_not_an_address(ip);
    let services = services(cli).await?;
    services
        .access_control
        .record_activity(account, ip, user_agent, access_type)
        .await?;
    let sessions = services.access_control.get_online_sessions(account).await?;
    print_json(&sessions)
}

pub(crate) async fn kick(
    cli: &crate::Cli,
    account: Uuid,
    ip: &str,
    block: bool,
    block_duration: Option<Duration>,
) -> Result<()> {
    let services = services(cli).await?;
    services
        .access_control
        .kick_session(account, ip, block, block_duration)
        .await?;
    info!(%account, %ip, "Session removed");
    Ok(())
}

pub(crate) async fn stats(
    cli: &crate::Cli,
    account: Uuid,
    max_concurrent: Option<u32>,
) -> Result<()> {
    let services = services(cli).await?;
    let stats = services
        .access_control
        .get_stats(account, max_concurrent)
        .await?;
    print_json(&stats)
}
