//! CLI-specific error types and exit code mapping

use centinela_core::error::{CentinelaError, StoreError};
use centinela_engine::EngineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The status store or task queue could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The scan ran but every module failed, or it did not settle in time.
    #[error("scan error: {0}")]
    Scan(String),

    /// The submission was rejected before any row was written.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// No scan with the given ID.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command error               |
    /// | 2    | Configuration error                   |
    /// | 3    | Backend unavailable                   |
    /// | 4    | Scan failed or did not settle         |
    /// | 5    | Submission rejected                   |
    /// | 6    | Scan not found                        |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::BackendUnavailable(_) => 3,
            Self::Scan(_) => 4,
            Self::Rejected(_) => 5,
            Self::NotFound(_) => 6,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<CentinelaError> for CliError {
    fn from(e: CentinelaError) -> Self {
        match e {
            CentinelaError::Config(_) | CentinelaError::Registry(_) => Self::Config(e.to_string()),
            CentinelaError::Submission(inner) => Self::Rejected(inner.to_string()),
            CentinelaError::Store(StoreError::Connection(reason)) => {
                Self::BackendUnavailable(reason)
            }
            CentinelaError::Io(inner) => Self::Io(inner),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Submission(inner) => Self::Rejected(inner.to_string()),
            EngineError::ScanNotFound(id) => Self::NotFound(format!("scan {id}")),
            EngineError::WaitTimeout { .. } => Self::Scan(e.to_string()),
            EngineError::Store(StoreError::Connection(reason)) => Self::BackendUnavailable(reason),
            other => Self::Command(other.to_string()),
        }
    }
}
