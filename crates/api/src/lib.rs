//! `api` crate — HTTP trigger surface for flow runs.
//!
//! Exposes:
//!   GET    /health
//!   POST   /api/v1/runs          start a run, returns 202 without waiting
//!   GET    /api/v1/runs/{id}     current state of a run
//!   DELETE /api/v1/runs/{id}     request cancellation

pub mod error;
pub mod handlers;

use std::future::Future;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use handlers::AppState;

/// Build the router. `cors_origin` restricts browser callers to one origin.
pub fn router(state: AppState, cors_origin: Option<HeaderValue>) -> Router {
    let cors = match cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(AllowOrigin::exact(origin)),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/runs", post(handlers::runs::start))
        .route(
            "/api/v1/runs/:id",
            get(handlers::runs::get).delete(handlers::runs::cancel),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` resolves, then cancel runs still
/// in flight.
pub async fn serve(
    bind: &str,
    state: AppState,
    cors_origin: Option<&str>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let cors_origin = cors_origin
        .map(HeaderValue::from_str)
        .transpose()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let app = router(state.clone(), cors_origin);

    let listener = TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API stopped; cancelling in-flight runs");
    state.cancel_all().await;
    Ok(())
}
