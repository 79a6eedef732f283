use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use haven::api::{self, AppState};
use haven::cache::{CacheStore, MemoryStore, ReadThroughCache};
use haven::config::Config;
use haven::engine::Engine;
use haven::reaper;
use haven::service::Service;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    haven::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path())?);
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let cache = ReadThroughCache::new(store.clone());

    tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));
    tokio::spawn(reaper::run_cache_sweeper(store, config.cache_sweep_interval));

    let app = api::router(AppState::new(Service::new(engine, cache)));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("haven listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("haven stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM; in-flight requests are drained by axum.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
