use anyhow::Result;
use tollgate_core::Services;

use crate::config::load_config;

pub(crate) async fn services(cli: &crate::Cli) -> Result<Services> {
    let config = load_config(&cli.config)?;
    Services::new(config).await
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
