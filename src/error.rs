//! Error types for the build monitor
//!
//! Only precondition violations and I/O problems are errors. Malformed
//! timing text and dropped report values are reported through `complete`
//! flags on the returned values instead, so callers can decide whether a
//! partial report is acceptable.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while recording, analyzing or exporting a build
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Unit finished without a matching begin: {0}")]
    FinishWithoutBegin(String),

    #[error("Critical path is empty, nothing to export")]
    EmptyCriticalPath,

    #[error("Timing data present for {units} unit(s) but no column index to place it")]
    MissingColumnIndex { units: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid event on line {line}: {source}")]
    EventParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write report to {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for build monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
