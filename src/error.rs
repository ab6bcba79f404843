// Allow module inception for error types - this is a common Rust pattern
#![allow(clippy::module_name_repetitions)]

use serde::Serialize;
use thiserror::Error;

/// Errors that reject a run before any task starts
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Invalid fetch size {0}: must be -1 (all), 0 (none) or a positive chunk size")]
    InvalidFetchSize(i64),

    #[error("No SQL statements to run")]
    EmptyQuerySet,

    #[error("Invalid instance count {0}: must be at least 1")]
    InvalidInstanceCount(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Statement source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;

/// Failure of a single instance
///
/// These never abort the batch. They are logged at the task boundary and
/// carried in the instance's result instead of a duration.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("Could not connect to the database{}: {message}", fmt_code(.code))]
    ConnectionFailure {
        code: Option<String>,
        message: String,
    },

    #[error("Statement execution failed{}: {message}", fmt_code(.code))]
    StatementExecutionFailure {
        code: Option<String>,
        message: String,
    },

    #[error("Instance panicked: {message}")]
    Panicked { message: String },
}

impl TaskError {
    pub fn connection(code: Option<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            code,
            message: message.into(),
        }
    }

    pub fn statement(code: Option<String>, message: impl Into<String>) -> Self {
        Self::StatementExecutionFailure {
            code,
            message: message.into(),
        }
    }

    /// Backend-native error code, when the driver reported one
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailure { code, .. } | Self::StatementExecutionFailure { code, .. } => {
                code.as_deref()
            }
            Self::Panicked { .. } => None,
        }
    }
}

fn fmt_code(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default()
}
