//! Error types for tradewind-worker.
//!
//! Protocol-level errors only. A job handler's own failure is never an
//! `Error` — it is recorded on the work item as data and feeds the retry
//! policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid work id: {0:?}")]
    InvalidId(String),

    #[error("work type is required")]
    WorkTypeRequired,

    #[error("work item {id} not found or not in status {expected}")]
    WorkNotFoundOrWrongStatus { id: String, expected: &'static str },

    #[error("no handler registered for work type {0:?}")]
    UnknownWorkType(String),

    #[error("invalid work status: {0:?}")]
    InvalidStatus(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable error code for API layers that surface typed codes
    /// (e.g. GraphQL `extensions.code`).
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidId(_) => "InvalidIdError",
            Error::WorkTypeRequired => "WorkTypeRequiredError",
            Error::WorkNotFoundOrWrongStatus { .. } => "WorkNotFoundOrWrongStatus",
            Error::UnknownWorkType(_) => "UnknownWorkTypeError",
            Error::InvalidStatus(_) => "InvalidStatusError",
            Error::Storage(_) => "StorageError",
            Error::Config(_) => "ConfigError",
            Error::Other(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
