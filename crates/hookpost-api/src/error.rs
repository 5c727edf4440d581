//! API error responses.
//!
//! Storage and validation errors map onto standardized JSON error bodies
//! with appropriate HTTP status codes. Internal failures are logged with
//! detail but surfaced to clients opaquely.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hookpost_core::CoreError;
use serde::Serialize;
use tracing::error;

/// An error response returned by a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// 404 with a resource-specific error code.
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, code, message: message.into() }
    }

    /// 400 for malformed or invalid request data.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "request_validation_failed",
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(message) => Self::not_found("not_found", message),
            CoreError::InvalidInput(message) => Self::bad_request(message),
            CoreError::ConstraintViolation(message) => Self {
                status: StatusCode::CONFLICT,
                code: "constraint_violation",
                message,
            },
            CoreError::Database(message) => {
                error!(error = %message, "storage failure while handling request");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal_server_error",
                    message: "internal server error".to_string(),
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { code: self.code, message: self.message };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_opaque_to_clients() {
        let api_error = ApiError::from(CoreError::Database("password=hunter2".to_string()));
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_error.message.contains("hunter2"));
    }

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let api_error = ApiError::from(CoreError::InvalidInput("name too short".to_string()));
        assert_eq!(api_error.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_error.message, "name too short");
    }

    #[test]
    fn not_found_maps_to_404() {
        let api_error = ApiError::from(CoreError::NotFound("gone".to_string()));
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
    }
}
