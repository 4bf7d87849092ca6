//! Error types for cachebench
//!
//! Every failure carries enough context (workload, phase, captured output)
//! to be diagnosed from the log line alone.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Cachebench error types
#[derive(Error, Debug)]
pub enum Error {
    /// The child process could not be started at all
    #[error("Failed to start process `{program}`: {source}\nCheck that the runtime executable exists and is executable")]
    ProcessStart {
        /// Program that was being spawned
        program: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// A phase exited with a nonzero status
    #[error("Phase `{phase}` failed for workload `{workload}` (exit code {exit_code})\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}")]
    PhaseExecution {
        /// Workload name
        workload: String,
        /// Phase name
        phase: String,
        /// Exit code, `-1` when terminated by a signal
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A phase exited cleanly but produced nothing usable
    #[error("Phase `{phase}` produced no measurements for workload `{workload}`")]
    PhaseOutput {
        /// Workload name
        workload: String,
        /// Phase name
        phase: String,
    },

    /// Repeats had no common non-empty length
    #[error("Insufficient data for workload `{workload}`: common series length is zero")]
    InsufficientData {
        /// Workload name
        workload: String,
    },

    /// Pre-flight configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Atomic rename of a staged file failed; the staging file is kept
    #[error("Failed to move {staged} into place: {source}")]
    Persist {
        /// Staging path left behind for inspection
        staged: PathBuf,
        /// Underlying rename error
        #[source]
        source: std::io::Error,
    },

    /// Chart rendering error
    #[error("Report error: {0}")]
    Report(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error (workload files, summaries)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short machine-friendly category, used as a structured log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProcessStart { .. } => "process_start",
            Self::PhaseExecution { .. } => "phase_execution",
            Self::PhaseOutput { .. } => "phase_output",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Config(_) => "config",
            Self::Storage(_) | Self::Persist { .. } => "storage",
            Self::Report(_) => "report",
            Self::Io(_) => "io",
            Self::Arrow(_) => "arrow",
            Self::Parquet(_) => "parquet",
            Self::Json(_) => "json",
        }
    }
}
