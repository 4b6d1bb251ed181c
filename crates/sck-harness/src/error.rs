#![forbid(unsafe_code)]

//! Error types for the regression harness.
//!
//! `HarnessError` aborts a whole batch. `RunError` and `ExtractError` stay
//! local to one test, which the scheduler reports as skipped.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("missing option or syntax error in {path} line {line}: `{content}`")]
    SpecSyntax {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("test definition {path} is missing required key `{key}`")]
    MissingField { path: PathBuf, key: &'static str },

    #[error("test definition {path} has an invalid `{key}`: {message}")]
    InvalidValue {
        path: PathBuf,
        key: &'static str,
        message: String,
    },

    #[error("failed reading test definitions from {path}: {source}")]
    UnreadableSpec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("simulator executable not found at {path}, halting")]
    SimulatorMissing { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn invalid_value(
        path: impl Into<PathBuf>,
        key: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            path: path.into(),
            key,
            message: message.into(),
        }
    }

    /// Whether the error came from the test definitions rather than the
    /// environment.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::SpecSyntax { .. }
                | Self::MissingField { .. }
                | Self::InvalidValue { .. }
                | Self::UnreadableSpec { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("simulator exited with {status}: {stderr}")]
    ExitStatus { status: ExitStatus, stderr: String },

    #[error("simulator still running after {0:?}, killed")]
    TimedOut(Duration),

    #[error("failed waiting on simulator: {0}")]
    Wait(#[source] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("search term `{term}` not found in simulator output")]
    TermNotFound { term: String },

    #[error("no numeric value on matched line `{line}`")]
    NoNumericToken { line: String },
}
