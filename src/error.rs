use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::durable::DurableError;
use crate::quiz::SupplierError;
use crate::store::StoreError;

/// Result type for engine operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors surfaced by lobby and match operations.
///
/// `NotFound`, `Forbidden` and `Conflict` are client-visible and not
/// retriable without a state change; the upstream variants mean a
/// collaborator failed and the operation can be retried.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("question supplier failed: {0}")]
    Supplier(#[from] SupplierError),

    #[error("durable store failed: {0}")]
    Durable(#[from] DurableError),

    #[error("storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        GameError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        GameError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        GameError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GameError::Internal(msg.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for GameError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Forbidden(_) => StatusCode::FORBIDDEN,
            GameError::Conflict(_) => StatusCode::CONFLICT,
            GameError::Supplier(_) | GameError::Durable(_) => StatusCode::BAD_GATEWAY,
            GameError::Store(_) | GameError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
