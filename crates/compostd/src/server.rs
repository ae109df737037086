//! HTTP server for compostd

use crate::query::QueryExecutor;
use crate::routes;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Largest accepted query or mutation body
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
pub struct AppState {
    pub executor: QueryExecutor,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(executor: QueryExecutor) -> Self {
        Self {
            executor,
            start_time: Instant::now(),
        }
    }
}

/// All routes with their middleware
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(routes::query_routes())
        .merge(routes::health_routes())
        .with_state(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server
pub async fn run(state: AppState, listen_addr: &str, request_timeout: Duration) -> Result<()> {
    let app = router(state, request_timeout);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down gracefully");
    }
}
