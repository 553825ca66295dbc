// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::error;

use crate::services::google::GoogleError;
use crate::services::google_api::GoogleApiError;
use crate::services::token_store::StoreError;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    InternalServer(String),
    ServiceUnavailable(String),
    BadGateway(String),
    StoreError(StoreError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Bad Gateway: {}", msg),
            ApiError::StoreError(e) => write!(f, "Store Error: {}", e),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message, code) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::InternalServer(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "INTERNAL_SERVER_ERROR",
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, "BAD_GATEWAY"),
            ApiError::StoreError(e) => {
                error!(error = %e, "Token store error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Token store operation failed".to_string(),
                    "STORE_ERROR",
                )
            }
        };

        let error_response = ErrorResponse {
            error: error_message,
            code: code.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StoreError(err)
    }
}

impl From<GoogleError> for ApiError {
    fn from(err: GoogleError) -> Self {
        match err {
            GoogleError::NotConfigured => {
                ApiError::ServiceUnavailable("Google OAuth is not configured".to_string())
            }
            GoogleError::EmptyUserId => ApiError::BadRequest("user id is required".to_string()),
            GoogleError::Store(e) => ApiError::StoreError(e),
            GoogleError::OAuthFailed { .. } => ApiError::BadRequest(err.to_string()),
            GoogleError::RequestFailed(_) | GoogleError::SerializationError(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<GoogleApiError> for ApiError {
    fn from(err: GoogleApiError) -> Self {
        match err {
            GoogleApiError::NoValidToken => ApiError::Unauthorized(
                "No valid Google access token available, link your Google account".to_string(),
            ),
            GoogleApiError::Token(e) => e.into(),
            GoogleApiError::RequestFailed(_) | GoogleApiError::Api { .. } => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}
