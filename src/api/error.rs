//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::capture::CaptureError;
use crate::recorder::SessionError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::Capture(CaptureError::PermissionDenied) => StatusCode::FORBIDDEN,
            SessionError::Capture(CaptureError::DeviceUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SessionError::Capture(CaptureError::Encoder(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::EmptyRecording => StatusCode::UNPROCESSABLE_ENTITY,
            SessionError::Upload(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.user_message())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
