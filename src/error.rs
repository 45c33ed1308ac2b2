//! Error types.
//!
//! `AppError` is what the binary sees: a message plus a process exit code.
//! The stage engines use typed errors (`FetchError`, `StoreError`,
//! `IngestError`, `AggregateError`) and the orchestrator folds those into
//! stage statuses or an `AppError`.
//!
//! Exit codes:
//! - 2: usage, configuration or output I/O problems
//! - 3: schema failures and stage-wide failures
//! - 4: fetch failed (including runs that continued on fallback data)
//! - 5: continuity violation against the master copy

use thiserror::Error;

use crate::ingest::ContinuityViolation;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Configuration or I/O problem (exit code 2).
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure to obtain a raw snapshot from a source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no registry entry for source {0}")]
    UnknownSource(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{0} returned no data rows")]
    EmptyPayload(String),

    #[error("could not parse snapshot from {origin}: {message}")]
    Parse { origin: String, message: String },
}

/// Failure to read or write a master copy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("master copy I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("master copy at {path} is not valid JSON: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("master copy at {path} failed its content hash check")]
    Corrupt { path: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("snapshot is missing critical columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("{} value(s) moved beyond tolerance inside the recency window", violations.len())]
    Continuity { violations: Vec<ContinuityViolation> },

    #[error("master copy changed during the run (expected version {expected})")]
    Conflict { expected: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("cleaned table has no rows to aggregate")]
    EmptyInput,

    #[error("cleaned table has no period columns")]
    NoPeriods,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::new(4, err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let code = match &err {
            IngestError::Fetch(_) => 4,
            IngestError::Schema { .. } => 3,
            IngestError::Continuity { .. } => 5,
            IngestError::Conflict { .. } | IngestError::Store(_) => 3,
        };
        AppError::new(code, err.to_string())
    }
}
