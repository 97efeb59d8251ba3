//! Transaction composer - build, sign and broadcast Ethereum-style transactions
//!
//! Serves transaction forms over HTTP. Each form session builds a transaction
//! from raw field values, has the wallet sign it through its JSON-RPC
//! `signTransaction` method, and broadcasts the signed payload to the chain.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod error;
mod metrics;
mod progress;
mod session;
mod submission;
mod tx;
mod wallet;

use api::AppState;
use chain::ChainManager;
use config::Settings;
use metrics::MetricsServer;
use session::SessionStore;
use wallet::WalletClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the output format can be chosen
    let settings = Settings::load()?;

    init_logging(settings.logging.json);

    info!("Starting tx-composer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration for {} network(s), default {}",
        settings.enabled_networks().len(),
        settings.default_network
    );
    if settings.wallet.passphrase.is_none() {
        warn!("No wallet passphrase configured - sign requests must supply one");
    }

    // Initialize network connections
    let chains = Arc::new(ChainManager::new(&settings).context("Failed to set up networks")?);
    info!("Network providers initialized");

    // Initialize wallet transport
    let wallet = WalletClient::new(&settings.wallet.rpc_url)
        .context("Failed to set up wallet RPC client")?;
    info!("Wallet RPC endpoint: {}", wallet.url());

    let idle_timeout = chrono::Duration::seconds(settings.server.session_idle_secs as i64);
    let sessions = Arc::new(SessionStore::new(
        chains.clone(),
        Arc::new(wallet),
        idle_timeout,
    ));

    let state = AppState {
        sessions: sessions.clone(),
        chains: chains.clone(),
        wallet: Arc::new(settings.wallet.clone()),
        dev_mode: settings.dev_mode,
    };

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.server.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Idle session cleanup loop
    let cleanup_handle = tokio::spawn({
        let sessions = sessions.clone();
        let interval = settings.server.cleanup_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
                sessions.cleanup();
            }
        }
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let chains = chains.clone();
        let interval = settings.server.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                let health = chains.health_check().await;
                for (network, healthy) in &health {
                    if !healthy {
                        warn!("Network {} health check failed", network);
                    }
                }

                metrics::record_health_check(health.iter().all(|(_, healthy)| *healthy));
            }
        }
    });

    info!("tx-composer is running");
    info!(
        "API server: http://{}:{}",
        settings.server.host, settings.server.port
    );
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    cleanup_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("tx-composer stopped with {} open session(s)", sessions.len());
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tx_composer=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
