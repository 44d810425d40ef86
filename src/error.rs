//! Error types for the Bulwark gateway.

use thiserror::Error;

use crate::sanitize::InjectionCategory;

/// Main error type for Bulwark operations.
#[derive(Error, Debug)]
pub enum BulwarkError {
    /// The client exhausted its request quota for the current window
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    QuotaExceeded { retry_after_secs: u64 },

    /// The prompt matched an injection rule
    #[error("Blocked: potential prompt injection detected ({category})")]
    ContentRejected { category: InjectionCategory },

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reading or writing persisted state failed, or persisted state is malformed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BulwarkError {
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<config::ConfigError> for BulwarkError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<BulwarkError> for tonic::Status {
    fn from(err: BulwarkError) -> Self {
        match err {
            BulwarkError::QuotaExceeded { .. } => tonic::Status::resource_exhausted(err.to_string()),
            BulwarkError::ContentRejected { .. } => tonic::Status::invalid_argument(err.to_string()),
            BulwarkError::NotFound(_) => tonic::Status::not_found("No data found"),
            // Everything else stays opaque to callers.
            _ => tonic::Status::internal("internal error"),
        }
    }
}

/// Result type alias for Bulwark operations.
pub type Result<T> = std::result::Result<T, BulwarkError>;
