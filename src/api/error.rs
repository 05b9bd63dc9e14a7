use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorKind, PipelineError};

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) => match e.kind() {
                ErrorKind::ValidationError | ErrorKind::UnknownSeriesTarget => {
                    StatusCode::BAD_REQUEST
                }
                ErrorKind::UnknownNode => StatusCode::NOT_FOUND,
                ErrorKind::SimulationFailed => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::SimulationTimeout => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    fn error_type(&self) -> String {
        match self {
            ApiError::BadRequest(_) => "BadRequest".to_string(),
            ApiError::ValidationError(_) => ErrorKind::ValidationError.to_string(),
            ApiError::Pipeline(e) => e.kind().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (stage, message) = match &self {
            ApiError::Pipeline(e) => {
                if e.source.is_user_correctable() {
                    tracing::debug!(error = %e, "client error");
                } else {
                    tracing::warn!(error = %e, kind = %e.kind(), "forecast pipeline failed");
                }
                (Some(e.stage.to_string()), e.source.to_string())
            }
            _ => {
                tracing::debug!(error = %self, "client error");
                (None, self.to_string())
            }
        };

        let body = ErrorResponse {
            error: self.error_type(),
            stage,
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
