use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::ingest::Ingestor;
use crate::server::api::{flush, health, ingest, ingest_gelf, stats};

pub fn build_router(ingestor: Arc<Ingestor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/gelf", post(ingest_gelf))
        .route("/flush", post(flush))
        .route("/stats", get(stats))
        .with_state(ingestor)
}

/// Serve the ingest API until the shutdown signal flips to true.
pub async fn serve(
    listener: TcpListener,
    ingestor: Arc<Ingestor>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = build_router(ingestor);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            info!("HTTP server shutting down gracefully");
        })
        .await
}
