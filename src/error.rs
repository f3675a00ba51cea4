//! Error handling

use std::path::PathBuf;

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;
use thiserror::Error;

// ============================================================================
// PIPELINE ERRORS
// ============================================================================

/// Batch producer failures. All of them abort the run.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(
        "none of the expected flow columns were found after stripping header spaces; \
         expected any of {expected:?}, got {found:?}"
    )]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("rows per batch must be at least 1")]
    InvalidBatchSize,

    #[error("failed to read source {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write batch {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: BatchError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A batch file that could not be read or written as CSV
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("malformed batch: {0}")]
    Malformed(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Classifier predict failure
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("classifier returned {got} labels for {expected} rows")]
    LengthMismatch { expected: usize, got: usize },

    #[error("classifier failed: {0}")]
    Model(String),
}

/// Classifier artifact could not be loaded
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Forwarding records to the relay failed
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay rejected batch: {0}")]
    Rejected(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Broker failures surfaced to ingest callers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay queue cannot allocate room for {requested} records")]
    ResourceExhausted { requested: usize },

    #[error("relay is shutting down")]
    Closed,
}

// ============================================================================
// HTTP ERRORS
// ============================================================================

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Validation errors
    ValidationError(String),

    // Capacity errors
    ResourceExhausted(String),
    Unavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::ResourceExhausted(msg) => {
                tracing::error!("Relay queue exhausted: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Relay queue exhausted")
            }
            AppError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Relay is shutting down"),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::ResourceExhausted { .. } => AppError::ResourceExhausted(err.to_string()),
            RelayError::Closed => AppError::Unavailable,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}
