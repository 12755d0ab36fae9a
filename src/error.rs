//! Error types for the training-load pipeline

use thiserror::Error;

/// Errors that can occur while extracting, aggregating or persisting features
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to parse activity payload: {0}")]
    ParseError(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Schema provisioning failed: {0}")]
    MigrationError(String),
}
