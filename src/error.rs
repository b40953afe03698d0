//! Error types and error handling for the application
//!
//! This module defines the HTTP-facing error type. Engine runs never fail
//! once accepted (total failure is expressed as response text plus zero
//! confidence), so the variants here cover request validation and the
//! unexpected-internal catch-all only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Each variant implements automatic conversion to HTTP responses via
/// `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request payload failed validation (empty query, oversized query, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
