//! Error types for workflowd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use workflow_types::{ValidationIssue, WorkflowError};

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Seed file could not be read or applied
    #[error("Seed error: {0}")]
    Seed(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Engine error, mapped by kind
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Malformed request outside the engine's concern (headers, query)
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationIssue>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Workflow(err) => match err {
                WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::Conflict(_) => StatusCode::CONFLICT,
                WorkflowError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::Unauthorized(_) => StatusCode::FORBIDDEN,
                WorkflowError::ConditionNotMet(_) => StatusCode::PRECONDITION_FAILED,
                WorkflowError::InvalidInput(_)
                | WorkflowError::InvalidTransition(_)
                | WorkflowError::Serialization(_) => StatusCode::BAD_REQUEST,
                WorkflowError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Workflow(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let details = match &self {
            ApiError::Workflow(WorkflowError::ValidationFailed(issues)) => Some(issues.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type ServerResult<T> = Result<T, ServerError>;
