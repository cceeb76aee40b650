/*!
Volsnap agent - keeps directories backed up across container restarts.

On startup every configured directory is restored from its newest snapshot.
While running, an HTTP `POST` triggers a backup. On SIGINT or SIGTERM the
server stops accepting requests and a final backup runs before exit.
*/

mod server;

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use volsnap_core::observability::init_observability;
use volsnap_core::Config;

use server::{build_app, AppState};

#[derive(Parser, Debug)]
#[command(name = "volsnap")]
#[command(about = "Restore directories on startup and back them up on demand and at shutdown")]
#[command(version)]
struct Cli {
    /// Configuration location: a path, file:// URI, http(s):// URL or s3://bucket/key
    #[arg(short, long, env = "VOLSNAP_CONFIG")]
    config: String,

    /// Port of the control endpoint
    #[arg(short, long, env = "VOLSNAP_PORT", default_value_t = 8000)]
    port: u16,

    /// Address the control endpoint binds to
    #[arg(long, env = "VOLSNAP_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Skip the restore on startup
    #[arg(long)]
    no_restore: bool,

    /// Skip the backup on shutdown
    #[arg(long)]
    no_backup: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "VOLSNAP_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_observability(cli.verbose, cli.json_logs)?;

    let location = cli.config.clone();
    let config = tokio::task::spawn_blocking(move || -> volsnap_core::Result<Config> {
        let config = Config::load(&location)?;
        config.validate()?;
        Ok(config)
    })
    .await?
    .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    info!(targets = config.backups.len(), "Configuration loaded");

    let state = AppState::new(config);

    if cli.no_restore {
        info!("Restore on startup disabled");
    } else {
        state.restore().await.context("Restore on startup failed")?;
    }

    let addr = SocketAddr::new(cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "Control endpoint listening");
    let served = axum::serve(listener, build_app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "Control endpoint stopped with an error");
    }

    if cli.no_backup {
        info!("Backup on shutdown disabled");
    } else {
        state.backup().await.context("Backup on shutdown failed")?;
    }

    served?;
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
