use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use salonbook::catalog::InMemoryCatalog;
use salonbook::compactor;
use salonbook::config::Config;
use salonbook::engine::Engine;
use salonbook::http;
use salonbook::payments::InMemoryPayments;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    salonbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let catalog = match &config.catalog_path {
        Some(path) => {
            let catalog = InMemoryCatalog::load(path)?;
            info!("loaded {} salons from {}", catalog.salon_count(), path.display());
            catalog
        }
        None => {
            tracing::warn!("SALONBOOK_CATALOG not set, starting with an empty catalog");
            InMemoryCatalog::new()
        }
    };

    let engine = Arc::new(Engine::new(
        config.wal_path(),
        Arc::new(catalog),
        Arc::new(InMemoryPayments::new()),
    )?);

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("salonbook listening on {addr}");
    info!("  wal: {}", config.wal_path().display());
    info!("  compact_threshold: {threshold}");
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("salonbook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. In-flight requests are drained by axum.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");
}
