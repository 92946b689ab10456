//! HTTP server for farmd

use crate::routes;
use crate::session::SessionStore;
use anyhow::Result;
use axum::Router;
use farm_common::{Advisor, Dataset, LlmClient, UsagePredictor};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers.
///
/// Dataset, predictor and advisor are read-only after startup; only the
/// session table is written.
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub predictor: Arc<UsagePredictor>,
    pub advisor: Arc<Advisor<dyn LlmClient>>,
    pub sessions: RwLock<SessionStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        dataset: Dataset,
        predictor: UsagePredictor,
        advisor: Arc<Advisor<dyn LlmClient>>,
    ) -> Self {
        Self {
            dataset: Arc::new(dataset),
            predictor: Arc::new(predictor),
            advisor,
            sessions: RwLock::new(SessionStore::new()),
            start_time: Instant::now(),
        }
    }
}

/// All routes with tracing, ready to serve or to drive from tests
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::data_routes())
        .merge(routes::advice_routes())
        .merge(routes::session_routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C
pub async fn run(state: AppState, addr: &str) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutting down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
