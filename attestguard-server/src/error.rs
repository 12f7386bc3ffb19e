//! API error handling module
//!
//! Verification failures are not errors: they are reported in a 200 response.
//! This type covers malformed requests and infrastructure failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::store::StoreError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - a required collaborator is not reachable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Device record store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(e) => match e {
                StoreError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::VersionConflict { .. } => StatusCode::CONFLICT,
                StoreError::Migration(_) | StoreError::Query(_) | StoreError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Store(e) => match e {
                StoreError::Connection(_) => "STORE_UNAVAILABLE",
                StoreError::VersionConflict { .. } => "RECORD_CONFLICT",
                _ => "STORE_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Never leak connection strings or SQL
            Self::Store(e) => match e {
                StoreError::Connection(_) => "Device store unavailable".to_string(),
                StoreError::VersionConflict { .. } => "Device record changed concurrently".to_string(),
                _ => "Device store error".to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Store(_) => "store",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let client_message = self.client_message();

        // Store outages are operational, not server bugs
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(
                status = %status,
                category = self.error_category(),
                code,
                error = %self,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = self.error_category(),
                code,
                error = %self,
                "Request failed"
            );
        }

        (status, Json(serde_json::json!({ "error": client_message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::internal("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::from(StoreError::Connection("refused".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StoreError::Query("syntax".into())).error_code(),
            "STORE_ERROR"
        );
    }

    #[test]
    fn test_version_conflict_is_409() {
        let err = ApiError::from(StoreError::VersionConflict {
            key_id: "k".into(),
            expected: Some(4),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "RECORD_CONFLICT");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_details_are_sanitized() {
        let err = ApiError::from(StoreError::Connection("postgres://user:secret@db".into()));
        assert_eq!(err.client_message(), "Device store unavailable");
        assert!(err.to_string().contains("secret"));
    }
}
