//! RDNS control-plane server entry point.
//!
//! Bootstraps the configured storage driver, builds the record/lease
//! engine, and starts the Axum HTTP server alongside the reaper and
//! metrics-emitter background tasks, all cooperating on one shutdown
//! signal — the same shape as `zvault-server`'s `main.rs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rdns_core::Engine;
use rdns_storage::DnsDriver;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use rdns_server::config::{DriverKind, ServerConfig};
use rdns_server::metrics::Metrics;
use rdns_server::routes::build_router;
use rdns_server::state::AppState;
use rdns_server::{metrics, reaper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().map_err(|err| anyhow::anyhow!(err))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(driver = ?config.driver, domain = %config.domain, "rdns-server starting");

    let driver = build_driver(&config).await?;
    let engine = Arc::new(Engine::new(driver, config.domain.clone()));
    let metrics = Arc::new(Metrics::new());
    let state = Arc::new(AppState {
        engine: Arc::clone(&engine),
        metrics: Arc::clone(&metrics),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper_handle = tokio::spawn(reaper::run(Arc::clone(&engine), shutdown_rx.clone()));
    let metrics_handle = tokio::spawn(metrics::run(Arc::clone(&engine), metrics, shutdown_rx.clone()));

    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "rdns-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for background tasks to stop");
    let _ = tokio::time::timeout(Duration::from_secs(10), reaper_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), metrics_handle).await;

    info!("rdns-server stopped");
    Ok(())
}

/// Build the configured storage driver.
///
/// # Errors
///
/// Returns an error if the selected driver's feature was not compiled in,
/// or the driver failed to connect to its backing store.
async fn build_driver(config: &ServerConfig) -> anyhow::Result<Arc<dyn DnsDriver>> {
    match config.driver {
        DriverKind::Kv => build_kv_driver(config).await,
        DriverKind::Sql => build_sql_driver(config).await,
    }
}

#[cfg(feature = "etcd-backend")]
async fn build_kv_driver(config: &ServerConfig) -> anyhow::Result<Arc<dyn DnsDriver>> {
    let driver = rdns_storage::KvDriver::connect(
        &config.kv_endpoints,
        config.kv_prefix.clone(),
        config.domain.clone(),
        config.ttl,
        config.frozen_ttl,
    )
    .await
    .context("failed to connect to etcd")?;
    Ok(Arc::new(driver))
}

#[cfg(not(feature = "etcd-backend"))]
async fn build_kv_driver(_config: &ServerConfig) -> anyhow::Result<Arc<dyn DnsDriver>> {
    anyhow::bail!("--driver kv requires the 'etcd-backend' feature, which was not compiled in")
}

async fn build_sql_driver(config: &ServerConfig) -> anyhow::Result<Arc<dyn DnsDriver>> {
    let provider = build_dns_provider(config).await;
    let driver = rdns_storage::sql::SqlDriver::connect(
        &config.database_url,
        provider,
        config.domain.clone(),
        config.ttl,
        config.frozen_ttl,
    )
    .await
    .context("failed to connect to the bookkeeping database")?;
    Ok(Arc::new(driver))
}

#[cfg(feature = "route53-backend")]
async fn build_dns_provider(config: &ServerConfig) -> Arc<dyn rdns_storage::sql::DnsProvider> {
    if let Some(zone_id) = &config.route53_zone_id {
        info!(zone_id = %zone_id, "using Route 53 managed-DNS provider");
        return Arc::new(rdns_storage::sql::Route53Provider::connect(zone_id.clone()).await);
    }
    tracing::warn!(
        "--driver sql selected without --route53-zone-id; falling back to an in-memory provider stub \
         (records will not persist or resolve for real clients)"
    );
    Arc::new(rdns_storage::sql::InMemoryProvider::new())
}

#[cfg(not(feature = "route53-backend"))]
async fn build_dns_provider(_config: &ServerConfig) -> Arc<dyn rdns_storage::sql::DnsProvider> {
    tracing::warn!(
        "--driver sql compiled without the 'route53-backend' feature; falling back to an in-memory \
         provider stub (records will not persist or resolve for real clients)"
    );
    Arc::new(rdns_storage::sql::InMemoryProvider::new())
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown to every background
/// task sharing `shutdown_tx`.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
