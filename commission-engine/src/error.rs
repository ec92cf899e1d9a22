//! Error types for the commission engine

use thiserror::Error;

/// Result type for commission operations
pub type Result<T> = std::result::Result<T, Error>;

/// Commission engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger / core error
    #[error("Ledger error: {0}")]
    Ledger(#[from] affiliate_core::Error),

    /// Rate resolution error (no applicable rate for the event)
    #[error("Rate resolution error: {0}")]
    Rate(String),

    /// Hierarchy constraint violated
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this is a conflict the caller should treat as "already done"
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Ledger(affiliate_core::Error::Conflict(_)))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
