use anyhow::Result;
use tracing::*;

use super::common::{print_json, services};

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let services = services(cli).await?;
    let stats = services.access_control.run_maintenance().await?;
    print_json(&stats)
}

pub(crate) async fn unblock(cli: &crate::Cli, ip: &str) -> Result<()> {
    let services = services(cli).await?;
    let removed = services.access_control.unblock_ip(ip).await?;
    if removed == 0 {
        warn!(%ip, "No global blacklist entry for this address");
    }
    Ok(())
}
