//! HTTP error taxonomy.
//!
//! Every failure surfaced to a client carries `{"error": {"message", "code"}}`
//! with a stable code. Internal errors are logged with context and masked
//! behind a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    code: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error while handling request");
            "Internal server error".to_string()
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
            self.to_string()
        };
        let body = ErrorBody {
            error: ErrorDetail {
                message,
                code: self.code(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailTaken => {
                Self::Conflict("User with this email already exists".to_string())
            }
            StoreError::MissingParty => Self::NotFound("User or player not found".to_string()),
            StoreError::UserNotFound => Self::NotFound("User not found".to_string()),
            StoreError::PlayerNotFound => Self::NotFound("Player not found".to_string()),
            StoreError::BalanceNotSet => Self::BadRequest("User balance not set".to_string()),
            StoreError::InsufficientBalance => {
                Self::BadRequest("Insufficient balance".to_string())
            }
            StoreError::AlreadyOwned => {
                Self::Conflict("Player is already in this collection".to_string())
            }
            StoreError::Backend(e) => Self::Internal(format!("storage backend error: {e}")),
            StoreError::Corrupt(e) => Self::Internal(format!("corrupt record: {e}")),
        }
    }
}

// Hashing and signing failures are never the caller's fault.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Internal(err.to_string())
    }
}
