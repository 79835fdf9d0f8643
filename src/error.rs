use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::response::ApiResponse;

/// Errors surfaced at the handler boundary.
#[derive(Debug)]
pub enum AppError {
    Malformed(String),
    NotFound(String),
    Conflict(String),
    /// Reserved for authorization denials; nothing produces it yet.
    Forbidden(String),
    Infrastructure(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Malformed(msg) => write!(f, "Malformed request: {msg}"),
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            AppError::Infrastructure(msg) => write!(f, "Infrastructure error: {msg}"),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Malformed(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Malformed(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Forbidden(msg) => {
                tracing::info!(%status, error = %self, "Request rejected");
                msg.clone()
            }
            AppError::Infrastructure(_) => {
                tracing::error!(%status, error = %self, "Request failed");
                "internal server error".to_string()
            }
        };

        (status, ApiResponse::<()>::failure(message)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("user not found".to_string()),
            RepoError::Conflict => AppError::Conflict("user exists".to_string()),
            RepoError::Infrastructure(detail) => AppError::Infrastructure(detail),
        }
    }
}

/// Domain errors returned by a [`crate::db::users::UserRepository`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("user not found")]
    NotFound,

    #[error("user exists")]
    Conflict,

    #[error("store failure: {0}")]
    Infrastructure(String),
}

/// Failures that abort the process before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database not reachable after {attempts} attempts within {timeout:?}")]
    StoreUnavailable { attempts: u32, timeout: Duration },

    #[error("startup interrupted by shutdown signal")]
    Cancelled,

    #[error("failed to apply migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}
