mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use logging::init_logging;
use tollgate_db_entities::AccessHistory::AccessType;
use uuid::Uuid;

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, default_value = "/etc/tollgate.yaml", env = "TOLLGATE_CONFIG")]
    config: PathBuf,

    #[arg(long, short, action=clap::ArgAction::Count)]
    debug: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum AccessTypeArg {
    Connection,
    Subscription,
    Api,
}

impl From<AccessTypeArg> for AccessType {
    fn from(value: AccessTypeArg) -> Self {
        match value {
            AccessTypeArg::Connection => AccessType::Connection,
            AccessTypeArg::Subscription => AccessType::Subscription,
            AccessTypeArg::Api => AccessType::Api,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum ListKind {
    Whitelist,
    Blacklist,
}

#[derive(clap::Subcommand)]
pub(crate) enum Commands {
    /// Run the maintenance loop and GeoIP watcher
    Run,
    /// Validate config file
    Check,
    /// Evaluate an access without recording it
    CheckAccess {
        #[arg(long)]
        account: Uuid,
        #[arg(long)]
        ip: String,
        #[arg(long, value_enum, default_value = "connection")]
        access_type: AccessTypeArg,
        /// Overrides the configured default. Zero means unlimited.
        #[arg(long)]
        max_concurrent: Option<u32>,
    },
    /// Record an accepted access
    RecordActivity {
        #[arg(long)]
        account: Uuid,
        #[arg(long)]
        ip: String,
        #[arg(long, default_value = "")]
        user_agent: String,
        #[arg(long, value_enum, default_value = "connection")]
        access_type: AccessTypeArg,
    },
    /// Disconnect a device from an account
    Kick {
        #[arg(long)]
        account: Uuid,
        #[arg(long)]
        ip: String,
        /// Also blacklist the address for this account
        #[arg(long)]
        block: bool,
        /// e.g. "30m". Defaults to the auto-blacklist duration.
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        block_duration: Option<Duration>,
    },
    /// Print usage statistics for an account
    Stats {
        #[arg(long)]
        account: Uuid,
        #[arg(long)]
        max_concurrent: Option<u32>,
    },
    /// Import addresses and ranges from a file, one per line
    Import {
        #[arg(value_enum)]
        list: ListKind,
        file: PathBuf,
        /// Scope entries to an account instead of globally
        #[arg(long)]
        account: Option<Uuid>,
        #[arg(long, default_value = "imported")]
        reason: String,
    },
    /// Lift a global blacklist entry and forget the address's failed attempts
    Unblock { ip: String },
    /// Run every cleanup sweep once
    Cleanup,
}

async fn _main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Commands::Run => crate::commands::run::command(&cli).await,
        Commands::Check => crate::commands::check::command(&cli).await,
        Commands::CheckAccess {
            account,
            ip,
            access_type,
            max_concurrent,
        } => {
            crate::commands::access::check_access(
                &cli,
                *account,
                ip,
                (*access_type).into(),
                *max_concurrent,
            )
            .await
        }
        Commands::RecordActivity {
            account,
            ip,
            user_agent,
            access_type,
        } => {
            crate::commands::access::record_activity(
                &cli,
                *account,
                ip,
                user_agent,
                (*access_type).into(),
            )
            .await
        }
        Commands::Kick {
            account,
            ip,
            block,
            block_duration,
        } => crate::commands::access::kick(&cli, *account, ip, *block, *block_duration).await,
        Commands::Stats {
            account,
            max_concurrent,
        } => crate::commands::access::stats(&cli, *account, *max_concurrent).await,
        Commands::Import {
            list,
            file,
            account,
            reason,
        } => crate::commands::import::command(&cli, *list, file, *account, reason).await,
        Commands::Unblock { ip } => crate::commands::cleanup::unblock(&cli, ip).await,
        Commands::Cleanup => crate::commands::cleanup::command(&cli).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(error) = _main().await {
        tracing::error!(?error);
        std::process::exit(1);
    }
}
