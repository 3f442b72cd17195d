//! Productivity BFF - Main Server
//!
//! Task tree, accounts and Google Calendar/Gmail sync behind one HTTP API.

use anyhow::Result;
use clap::{Parser, Subcommand};
use productivity_bff::{sync::cron::RENEW_WITHIN_HOURS, AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "productivity-bff")]
#[command(about = "Backend-for-frontend for tasks, calendar and email")]
struct Cli {
    /// Path to the YAML config file (default: ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Renew push subscriptions that are about to expire
    RenewWatches {
        /// Renew watches expiring within this many hours
        #[arg(long, default_value_t = RENEW_WITHIN_HOURS)]
        hours: i64,
    },

    /// Incremental Gmail and Calendar sync for every connected user
    SyncAll,

    /// Full re-sync for users not synced in the last day
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,productivity_bff=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            let state = AppState::new(config).await?;
            productivity_bff::start_server(state).await
        }
        Commands::RenewWatches { hours } => {
            let state = AppState::new(config).await?;
            let report = state.sync_service().renew_expiring(hours).await?;
            tracing::info!(
                "Renewal complete: {} expiring, {} renewed, {} errors",
                report.total_expiring,
                report.renewed,
                report.errors
            );
            Ok(())
        }
        Commands::SyncAll => {
            let state = AppState::new(config).await?;
            let report = state.sync_service().incremental_sync_all().await?;
            tracing::info!(
                "Sync complete: {} users, {} synced, {} skipped, {} errors",
                report.total_users,
                report.success,
                report.skipped,
                report.errors
            );
            Ok(())
        }
        Commands::Verify => {
            let state = AppState::new(config).await?;
            let report = state.sync_service().daily_verification().await?;
            tracing::info!(
                "Verification complete: {} stale, {} verified, {} errors",
                report.total_stale,
                report.verified,
                report.errors
            );
            Ok(())
        }
    }
}
