//! txscope service binary.
//!
//! Loads configuration, wipes the cache store for a fresh instance, starts
//! the streaming tasks under a shared cancellation token, and serves the
//! read-only HTTP API until SIGINT/SIGTERM.

mod routes;

use anyhow::Context;
use std::{net::Ipv4Addr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use txscope_query::QueryService;
use txscope_service::{Config, Supervisor};
use txscope_storage::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "cfg/config.yaml".to_owned());
    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {config_path}"))?;
    let config = Config::from_yaml_str(&raw)?;

    init_tracing(&config);

    let redis_url =
        std::env::var("REDIS_URL").context("REDIS_URL environment variable is not set")?;
    // Required for presence; persistence beyond the cache is not wired up yet.
    std::env::var("POSTGRES_URL").context("POSTGRES_URL environment variable is not set")?;

    // Connecting wipes cache keys for a fresh instance.
    let store = Arc::new(RedisStore::connect(&redis_url).await?);

    let cancel_token = CancellationToken::new();
    spawn_signal_handler(cancel_token.clone());

    let clients = config.endpoints.iter().map(|endpoint| endpoint.name.clone()).collect();
    let query = Arc::new(QueryService::new(store.clone(), clients, config.focil_enabled()));

    let port = std::env::var("PORT").ok().and_then(|port| port.parse().ok()).unwrap_or(8080u16);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    info!(target: "txscope", port, "Serving API");
    let shutdown = cancel_token.clone();
    let http = tokio::spawn(async move {
        axum::serve(listener, routes::router(query))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
    });

    Supervisor::new(config, store, cancel_token).run().await?;
    http.await??;

    info!(target: "txscope", "Shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    let production = std::env::var("ENV").is_ok_and(|env| env == "prod");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if production {
        builder.compact().with_ansi(false).init();
    } else {
        builder.init();
    }
}

fn spawn_signal_handler(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!(target: "txscope", "Shutting down...");
        cancel_token.cancel();
    });
}
