//! Error types for shipyard-control.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
///
/// The first five variants are the caller-facing taxonomy. Each maps to a
/// stable HTTP status so automation can tell retryable failures apart from
/// caller bugs without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Unknown service, environment, version or approval.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request must be changed before it can succeed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another operation or an outstanding approval owns the target.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The entity is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The deployment executor reported a failure.
    #[error("executor failure: {0}")]
    ExecutorFailure(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid-state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an executor failure.
    #[must_use]
    pub fn executor(msg: impl Into<String>) -> Self {
        Self::ExecutorFailure(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Machine-readable error kind used in response bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::ExecutorFailure(_) => "executor_failure",
            Self::Config(_) | Self::Http(_) | Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ExecutorFailure(_)
            | Self::Config(_)
            | Self::Http(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the identical request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<JsonRejection> for ControlError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for ControlError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable error kind.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            Self::NotFound(msg)
            | Self::InvalidArgument(msg)
            | Self::Conflict(msg)
            | Self::InvalidState(msg)
            | Self::ExecutorFailure(msg) => msg.clone(),

            // Hide internal details
            Self::Config(_) | Self::Http(_) | Self::Internal(_) => {
                "internal server error".to_owned()
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            kind: self.kind(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
