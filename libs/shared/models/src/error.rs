use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Unavailable carries a retry hint so clients keep their form
        // state and offer a retry instead of discarding the attempt.
        let (status, retryable, message) = match &self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, false, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, false, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, false, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, false, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, true, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, false, msg),
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "error": message,
            "retryable": retryable
        }));

        (status, body).into_response()
    }
}
