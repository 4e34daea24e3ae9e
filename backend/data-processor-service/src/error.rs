//! Error types for the data processor
//!
//! Every stage returns [`AppError`]; the orchestrator decides per stage whether
//! an error aborts the tick or is downgraded to a warning.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for data processor operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Broker connection, channel or consume failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Filesystem or process spawn failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External program exited unsuccessfully; `None` when terminated by a signal
    #[error("External program failed (exit code: {})", format_exit_code(.exit_code))]
    ExternalProgram { exit_code: Option<i32> },

    /// Mandatory artifact absent after a successful external run
    #[error("Artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// Relational store failure, including CSV parsing of processed artifacts
    #[error("Load error: {0}")]
    Load(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Load(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Load(format!("migration failed: {err}"))
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Load(format!("CSV error: {err}"))
    }
}

impl From<lapin::Error> for AppError {
    fn from(err: lapin::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}
