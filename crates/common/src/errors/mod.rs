//! Error types for IKMS services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Message returned to callers for unexpected failures
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Fixed messages shown to callers when an upstream dependency fails
pub const GENERATION_UNAVAILABLE_MESSAGE: &str = "Generation service unavailable";
pub const RETRIEVAL_UNAVAILABLE_MESSAGE: &str = "Retrieval service unavailable";
pub const EMBEDDING_UNAVAILABLE_MESSAGE: &str = "Embedding service unavailable";

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request errors
    ValidationError,
    InvalidFormat,
    RateLimited,
    Timeout,

    // Upstream dependencies
    GenerationError,
    RetrievalError,
    EmbeddingError,

    // Our own faults
    InternalError,
    ConfigurationError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    #[error("Request did not complete within {secs} seconds")]
    Timeout { secs: u64 },

    // Upstream failures. The message may carry raw response bodies and is
    // only ever logged.
    #[error("Generation service error: {message}")]
    GenerationError { message: String },

    #[error("Retrieval service error: {message}")]
    RetrievalError { message: String },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::GenerationError { .. } => ErrorCode::GenerationError,
            AppError::RetrievalError { .. } => ErrorCode::RetrievalError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 408 Request Timeout
            AppError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. } | AppError::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 502 Bad Gateway
            AppError::GenerationError { .. }
            | AppError::RetrievalError { .. }
            | AppError::EmbeddingError { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message safe to show to API consumers.
    ///
    /// Server-side failures collapse to a fixed string per kind; the full
    /// error is only ever logged.
    pub fn public_message(&self) -> String {
        match self {
            AppError::GenerationError { .. } => GENERATION_UNAVAILABLE_MESSAGE.to_string(),
            AppError::RetrievalError { .. } => RETRIEVAL_UNAVAILABLE_MESSAGE.to_string(),
            AppError::EmbeddingError { .. } => EMBEDDING_UNAVAILABLE_MESSAGE.to_string(),
            AppError::Internal { .. } | AppError::Configuration { .. } => {
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Log this error at a level matching its severity
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.code();

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    /// Body returned when a handler panics or fails unexpectedly
    pub fn internal() -> Self {
        Self {
            error: ErrorDetails {
                code: ErrorCode::InternalError,
                message: INTERNAL_ERROR_MESSAGE.to_string(),
                field: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code: self.code(),
                message: self.public_message(),
                field,
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::GenerationError {
            message: "quota exceeded".into(),
        };
        assert_eq!(err.code(), ErrorCode::GenerationError);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "`question` must be a non-empty string.".into(),
            field: Some("question".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_internal_error_does_not_leak() {
        let err = AppError::Internal {
            message: "connection string postgres://secret".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_upstream_body_is_not_exposed() {
        let err = AppError::GenerationError {
            message: r#"LLM API error 401 Unauthorized: {"error": "Incorrect API key provided: sk-abc***xyz"}"#.into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.public_message(), GENERATION_UNAVAILABLE_MESSAGE);
        assert!(!err.public_message().contains("sk-abc"));
        // The detail is still available to the logs
        assert!(err.to_string().contains("sk-abc"));

        let err = AppError::RetrievalError {
            message: "Vector index error 403 Forbidden: invalid Api-Key".into(),
        };
        assert_eq!(err.public_message(), RETRIEVAL_UNAVAILABLE_MESSAGE);

        let err = AppError::EmbeddingError {
            message: "API error 429: quota".into(),
        };
        assert_eq!(err.public_message(), EMBEDDING_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_timeout_is_reported() {
        let err = AppError::Timeout { secs: 30 };
        assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.public_message().contains("30 seconds"));
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InternalError).unwrap();
        assert_eq!(json, "\"INTERNAL_ERROR\"");
    }
}
