//! Error types for Hardpoint Flux

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during computation
///
/// Missing or sparse telemetry is not an error: stages report it as `None` or
/// an empty result. These variants cover I/O, malformed inputs and contract
/// violations between the pipeline and its callers.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Telemetry query failed for {topic}: {message}")]
    Telemetry { topic: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    #[error("Timestamp parse error: {0}")]
    TimestampParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Malformed record in {path}: {message}")]
    MalformedRecord { path: PathBuf, message: String },
}

impl ComputeError {
    pub(crate) fn telemetry(topic: &str, message: impl Into<String>) -> Self {
        ComputeError::Telemetry {
            topic: topic.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn missing_column(table: impl Into<String>, column: &str) -> Self {
        ComputeError::MissingColumn {
            table: table.into(),
            column: column.to_string(),
        }
    }
}
