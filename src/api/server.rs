use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info};

use super::{
    services::{fetch_images, get_label, health, list_entries, list_labels, metrics},
    state::AppState,
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::registry::EntryRegistry;
use crate::scheduler::Scheduler;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Routes without a listener; used by `run` and by tests via `oneshot`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/services/fetch_images", post(fetch_images))
        .route("/entries", get(list_entries))
        .route("/entries/{entry_id}/labels", get(list_labels))
        .route("/entries/{entry_id}/labels/{label}", get(get_label))
        .route("/operators/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
        // Gzip trigger bodies are decompressed before the handlers see them
        .layer(RequestDecompressionLayer::new())
}

/// Build entries, start timers and serve until a shutdown signal
pub async fn run(config: Config, address: SocketAddr) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    info!(entries = config.entries.len(), "Building entry registry");
    let registry = Arc::new(
        EntryRegistry::from_config(&config, metrics.clone())
            .map_err(|e| format!("Failed to build entries: {e}"))?,
    );

    let scheduler = Scheduler::start(&registry);
    info!(timers = scheduler.active_timers(), "Fetch timers started");
    let stop = scheduler.stop_handle();

    let app = router(AppState::new(registry, metrics).with_shutdown(stop.subscribe()));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Molnus bridge API listening");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Timers and in-flight on-demand cycles stop before the drain
            stop.stop();
        })
        .await;

    scheduler.shutdown().await;
    served?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
