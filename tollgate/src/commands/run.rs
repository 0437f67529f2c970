use anyhow::Result;
use tracing::*;

use super::common::services;
use crate::config::watch_geoip_database;

#[cfg(target_os = "linux")]
use sd_notify::NotifyState;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "Tollgate");

    let services = services(cli).await?;
    services.config.validate();

    let maintenance = services.start_maintenance();

    if let Some(path) = services.config.geoip_database_path() {
        let reader = services.geo_reader.clone();
        tokio::spawn(async move {
            if let Err(error) = watch_geoip_database(path, reader).await {
                error!(?error, "GeoIP database watcher stopped");
            }
        });
    }

    if console::user_attended() {
        let settings = services.access_control.settings().await;
        info!("--------------------------------------------");
        info!("Tollgate is now running.");
        info!(
            "Restriction {}, default limit {} devices, inactivity timeout {:?}",
            if settings.enabled { "enabled" } else { "disabled" },
            settings.default_max_concurrent_sessions,
            settings.inactivity_timeout,
        );
        info!(
            "GeoIP database {}",
            if services.geo_reader.is_loaded().await {
                "loaded"
            } else {
                "not loaded"
            }
        );
        if maintenance.is_none() {
            info!("Maintenance sweeps are disabled");
        }
        info!("--------------------------------------------");
    }

    #[cfg(target_os = "linux")]
    if let Ok(true) = sd_notify::booted() {
        use std::time::Duration;
        tokio::spawn(async {
            if let Err(error) = async {
                sd_notify::notify(false, &[NotifyState::Ready])?;
                loop {
                    sd_notify::notify(false, &[NotifyState::Watchdog])?;
                    tokio::time::sleep(Duration::from_secs(15)).await;
                }
                #[allow(unreachable_code)]
                Ok::<(), anyhow::Error>(())
            }
            .await
            {
                error!(?error, "Failed to communicate with systemd");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    if let Some(handle) = maintenance {
        handle.abort();
    }
    services.geo_reader.close().await;
    Ok(())
}
