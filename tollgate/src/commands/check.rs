use anyhow::Result;
use tracing::*;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    config.validate();
    if let Some(path) = config.geoip_database_path() {
        if !path.exists() {
            warn!(path = %path.display(), "GeoIP database file does not exist");
        }
    }
    info!("No problems found");
    Ok(())
}
