//! Error taxonomy shared by the service layer and its HTTP mapping.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{quiz::source::SourceError, state::state_machine::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested lobby, player, or question was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation is invalid for the current lobby or game status.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A start precondition (player count, status) is not met.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// Lobby is at capacity.
    #[error("lobby full: {0}")]
    Capacity(String),
    /// Caller lacks the privilege or identity required for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// A second answer was submitted for the same round.
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// The question/evaluation collaborator failed; recovered locally.
    #[error("upstream source failed")]
    Upstream(#[source] SourceError),
    /// The fanout transport rejected a publish after retries.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Stable machine-readable discriminator surfaced alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidState(_) => "conflict",
            ServiceError::Precondition(_) => "precondition",
            ServiceError::Capacity(_) => "capacity",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Duplicate(_) => "duplicate",
            ServiceError::Upstream(_) => "upstream",
            ServiceError::Transport(_) => "transport",
            ServiceError::Timeout => "timeout",
        }
    }
}

impl From<SourceError> for ServiceError {
    fn from(err: SourceError) -> Self {
        ServiceError::Upstream(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
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
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
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
        let kind = err.kind();
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidState(message)
            | ServiceError::Precondition(message)
            | ServiceError::Capacity(message)
            | ServiceError::Duplicate(message) => AppError::Conflict(format!("{kind}: {message}")),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Upstream(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Transport(message) => AppError::ServiceUnavailable(message),
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
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
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
