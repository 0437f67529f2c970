use std::path::Path;

use anyhow::{Context, Result};
use tracing::*;
use uuid::Uuid;

use super::common::{print_json, services};
use crate::ListKind;

/// Reads one address or range per line. Blank lines and `#` comments are ignored.
pub(crate) async fn command(
    cli: &crate::Cli,
    list: ListKind,
    file: &Path,
    account: Option<Uuid>,
    reason: &str,
) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Could not read {}", file.display()))?;
    let lines: Vec<&str> = content.lines().collect();

    let services = services(cli).await?;
    let lists = services.access_control.lists();
    let report = match list {
        ListKind::Whitelist => lists.import_whitelist(&lines, account, reason).await?,
        ListKind::Blacklist => lists.import_blacklist(&lines, account, reason, None).await?,
    };

    for value in &report.skipped {
        warn!(%value, "Skipped invalid entry");
    }
    print_json(&report)
}
