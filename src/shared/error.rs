use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::validators::ValidationError;

/// Standard error response payload
/// Contains stable machine-readable error code, human-readable message, and request ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable error code (e.g., "NOT_FOUND")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Request ID for tracing and debugging
    pub request_id: String,
}

impl ErrorResponse {
    pub fn new(
        error: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: request_id.into(),
        }
    }
}

/// Error codes used by the HTTP surface
pub mod error_codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid database path: {0}")]
    InvalidPath(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Weather API errors for a single lookup attempt
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No solar value reported for {0}")]
    NoData(String),
}

/// Model artifact errors; all of them are fatal at startup
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model artifact {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Inconsistent model shape: {0}")]
    Shape(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Feature vector errors; the field is skipped for the cycle
#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("Window must contain exactly {expected} records, got {actual}")]
    WindowSize { expected: usize, actual: usize },

    #[error("Feature vector has {actual} values, model expects {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("Feature '{0}' is not a finite number")]
    NonFinite(String),
}

/// Errors that abort processing of one field for the current cycle
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Invalid key: {0}")]
    InvalidKey(#[from] ValidationError),
}
