use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::status::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Session, participant, or question does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The requested action is not allowed from the session's current phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// A non-host issued a control action, or a left/kicked participant acted.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// An answer already exists for this question, or one is in flight.
    #[error("duplicate submission: {0}")]
    DuplicateSubmission(String),
    /// Join-code generation was exhausted or the session is full.
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),
    /// The current question has no answers left to accept.
    #[error("no more questions")]
    NoMoreQuestions,
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Timeout { .. } => ServiceError::Timeout,
            // The only unique constraint outside answer idempotency is the
            // live join code, whose allocator retries before giving up.
            StorageError::Conflict { message } => ServiceError::CapacityExhausted(message),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidTransition(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller may not perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidTransition(message) => AppError::Conflict(message),
            ServiceError::AccessDenied(message) => AppError::Forbidden(message),
            ServiceError::DuplicateSubmission(message) => AppError::Conflict(message),
            ServiceError::CapacityExhausted(message) => AppError::Conflict(message),
            ServiceError::NoMoreQuestions => AppError::Conflict("no more questions".into()),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
