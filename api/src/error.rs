//! Error handling and custom error types for the API
//!
//! One taxonomy for everything the ingestion surface can say "no" to:
//! authentication failures are terminal and deliberately generic on the
//! wire, validation failures are terminal and descriptive, and store or
//! reconciliation failures are transient and carry a retry hint. Skips and
//! duplicates are success acknowledgments, not errors, and live in
//! `models::IngestAck`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Main API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential header on the request
    #[error("Missing API key")]
    MissingApiKey,

    /// Credential matched no account and no usable setup token. The precise
    /// sub-reason (expired token, consumed token) is logged server-side but
    /// never leaks to the unauthenticated caller.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Malformed payload; the caller must fix and resubmit under a fresh
    /// idempotency key
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Persistence or reconciliation failed on infrastructure; retryable
    #[error("Storage error: {message}")]
    Store { message: String, retry_after_ms: u64 },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S, field: Option<S>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(|f| f.into()),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transient store error carrying the configured retry hint
    pub fn store<S: Into<String>>(message: S, retry_after_ms: u64) -> Self {
        Self::Store {
            message: message.into(),
            retry_after_ms,
        }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for the error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Config { .. } | ApiError::Store { .. } | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::MissingApiKey | ApiError::InvalidApiKey => "UNAUTHORIZED",
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Config { .. } => "CONFIG_ERROR",
            ApiError::Store { .. } => "TRANSIENT_STORE_FAILURE",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// True when the caller should retry after the hinted delay
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Store { .. })
    }

    /// Log the error appropriately based on type
    pub fn log_error(&self) {
        match self {
            ApiError::Config { message } => error!("Configuration error: {}", message),
            ApiError::Internal { message } => error!("Internal server error: {}", message),
            ApiError::Store { message, .. } => error!("Transient store failure: {}", message),
            ApiError::MissingApiKey | ApiError::InvalidApiKey => {
                warn!("Authentication failure: {}", self)
            }
            _ => debug!("Client error: {}", self),
        }
    }
}

/// Wire shape for error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Custom result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_error();

        let retry_after = match &self {
            ApiError::Store { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        };

        let body = ErrorBody {
            status: "error",
            message: self.to_string(),
            retry_after,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal {
            message: format!("Serialization error: {}", err),
        }
    }
}

impl From<axum::Error> for ApiError {
    fn from(err: axum::Error) -> Self {
        ApiError::Internal {
            message: format!("Server error: {}", err),
        }
    }
}
