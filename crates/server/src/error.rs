//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before the response is built; clients only ever see
//! generic messages for them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use warehub_core::{ConsumeReport, FailureReason};

use crate::db::RepositoryError;
use crate::ledger::ConsumeError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Consume call failed.
    #[error("Consume error: {0}")]
    Consume(#[from] ConsumeError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Consume(err) => match err.reason() {
                FailureReason::NotAuthenticated => StatusCode::UNAUTHORIZED,
                FailureReason::NoPass
                | FailureReason::PassExpired
                | FailureReason::PassExhausted => StatusCode::FORBIDDEN,
                FailureReason::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                // The listing is unlocked; the client proceeds as on success.
                FailureReason::ChargeLostAfterUnlock => StatusCode::OK,
            },
        }
    }

    const fn is_server_error(&self) -> bool {
        match self {
            Self::Database(RepositoryError::NotFound | RepositoryError::Conflict(_)) => false,
            Self::Database(_) | Self::Internal(_) => true,
            Self::Consume(err) => matches!(
                err,
                ConsumeError::StoreUnavailable(_)
                    | ConsumeError::UnlockNotConfirmed
                    | ConsumeError::ChargeLostAfterUnlock { .. }
            ),
            Self::NotFound(_) | Self::BadRequest(_) => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();

        if let Self::Consume(err) = &self {
            return (status, Json(ConsumeReport::failed(err.reason()))).into_response();
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(_)) => "Conflict".to_string(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
