//! Error types for the fund evaluation system.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Batch timed out after {timeout_secs}s")]
    BatchTimeout { timeout_secs: u64 },

    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        Error::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Aggregation key used by pass summaries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InsufficientData { .. } => ErrorKind::InsufficientData,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::BatchTimeout { .. } => ErrorKind::BatchTimeout,
            Error::PersistenceConflict(_) => ErrorKind::PersistenceConflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Config { .. } | Error::ConfigFile(_) => ErrorKind::Config,
            Error::Json(_) | Error::Database(_) | Error::Io(_) => ErrorKind::Storage,
            Error::TaskFailed(_) => ErrorKind::TaskFailed,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether a later, more relaxed pass may still succeed for this entity.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InsufficientData | ErrorKind::BatchTimeout | ErrorKind::Storage
        )
    }
}

/// Coarse error category, used as a counting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientData,
    InvalidInput,
    BatchTimeout,
    PersistenceConflict,
    NotFound,
    Config,
    Storage,
    TaskFailed,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::BatchTimeout => "batch_timeout",
            ErrorKind::PersistenceConflict => "persistence_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Config => "config",
            ErrorKind::Storage => "storage",
            ErrorKind::TaskFailed => "task_failed",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
