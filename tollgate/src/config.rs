use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tollgate_common::{TollgateConfig, TollgateConfigStore};
use tollgate_core::GeoReaderSlot;
use tracing::*;

pub fn load_config(path: &Path) -> Result<TollgateConfig> {
    let store: TollgateConfigStore = Config::builder()
        .add_source(File::from(path))
        .add_source(
            Environment::with_prefix("TOLLGATE")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Could not load config")?
        .try_deserialize()
        .context("Could not parse config")?;

    let config = TollgateConfig {
        store,
        paths_relative_to: path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    info!(
        "Using config: {path:?} (geoip: {}, maintenance: {})",
        config.store.geoip.database.as_deref().unwrap_or("none"),
        if config.store.maintenance.enable {
            "enabled"
        } else {
            "disabled"
        },
    );
    Ok(config)
}

/// Reloads the GeoIP database whenever the file is replaced or rewritten.
/// The parent directory is watched so atomic renames are seen too.
pub async fn watch_geoip_database(path: PathBuf, reader: Arc<GeoReaderSlot>) -> Result<()> {
    let directory = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("GeoIP database path has no parent directory"))?;

    let (tx, mut rx) = mpsc::channel(16);
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.blocking_send(res);
    })?;
    watcher.watch(&directory, RecursiveMode::NonRecursive)?;

    loop {
        match rx.recv().await {
            Some(Ok(event)) => {
                let relevant = (event.kind.is_modify() || event.kind.is_create())
                    && event.paths.iter().any(|p| p.file_name() == path.file_name());
                if relevant {
                    if let Err(error) = reader.reload(&path).await {
                        error!(?error, "Failed to reload GeoIP database");
                    }
                }
            }
            Some(Err(error)) => error!(?error, "Failed to watch GeoIP database"),
            None => {
                error!("GeoIP database watch failed");
                return Ok(());
            }
        }
    }
}
