//! Application error types.
//!
//! Every failure inside the bridge is an `AppError`. Database failures are
//! turned into bridge failure replies by the dispatcher; everything that
//! reaches an axum handler boundary is rendered through `IntoResponse`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request payload failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Request payload could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Bridge operation name is not part of the surface.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Opening or probing the database failed.
    #[error("{0}")]
    DatabaseConnection(String),

    /// The driver rejected a statement.
    #[error("{0}")]
    DatabaseQuery(String),

    /// Operation requires a live session and there is none.
    #[error("no active database session")]
    NoActiveSession,

    /// Caller referenced a session token that is no longer live.
    #[error("session {supplied} is no longer active (current: {current})")]
    StaleSession { supplied: u64, current: u64 },

    /// A newer connect or disconnect was issued while this connect was in flight.
    #[error("connect superseded by a newer session request")]
    SessionSuperseded,

    /// Outbound HTTP request failed before a usable response was read.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serializing a reply failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            AppError::DatabaseConnection(_) => "DB_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DB_QUERY_ERROR",
            AppError::NoActiveSession => "NO_ACTIVE_SESSION",
            AppError::StaleSession { .. } => "STALE_SESSION",
            AppError::SessionSuperseded => "SESSION_SUPERSEDED",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used when the error crosses the axum boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownOperation(_) => StatusCode::NOT_FOUND,
            AppError::NoActiveSession
            | AppError::StaleSession { .. }
            | AppError::SessionSuperseded => StatusCode::CONFLICT,
            AppError::DatabaseConnection(_) | AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseQuery(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Transport(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
