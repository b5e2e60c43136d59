//! HTTP-facing error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is well-formed JSON but not acceptable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The flow does not form a single runnable chain.
    #[error("invalid flow: {0}")]
    InvalidFlow(#[from] EngineError),

    #[error("run not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::InvalidFlow(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
