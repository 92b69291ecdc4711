//! API error types and HTTP response conversion
//!
//! Engine errors map onto HTTP status codes: definition errors are 400,
//! unknown graphs and runs are 404, storage and transition failures are 500.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use workflow_core::EngineError;

/// API error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for programmatic handling
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    InternalError(String),

    #[error("Invalid JSON body: {0}")]
    JsonError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::JsonError(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::JsonError(_) => "JSON_ERROR",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::InternalError(_) => "InternalError",
            ApiError::JsonError(_) => "JsonError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse::new(self.error_type(), self.to_string(), self.code());

        if status.is_server_error() {
            tracing::error!(status = %status, message = %body.message, "API error");
        } else {
            tracing::warn!(status = %status, message = %body.message, "API request rejected");
        }

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::GraphNotFound(_) | EngineError::RunNotFound(_) => ApiError::NotFound(err.to_string()),
            // Keep the bare definition message, e.g. "start_node 'x' not found in nodes"
            EngineError::InvalidGraph(inner) => ApiError::BadRequest(inner.to_string()),
            EngineError::Store(_) | EngineError::InvalidStateTransition { .. } => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::JsonError(rejection.body_text())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_core::GraphError;

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::GraphNotFound("g1".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Graph g1 not found");

        let err: ApiError = EngineError::InvalidGraph(GraphError::UnknownEdgeSource("q".into())).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Edge source 'q' not found in nodes");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(ApiError::JsonError("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InternalError("x".into()).error_type(), "InternalError");
    }
}
