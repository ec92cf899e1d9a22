//! Error types for the payout engine

use thiserror::Error;

/// Result type for payout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payout engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger / core error
    #[error("Ledger error: {0}")]
    Ledger(#[from] affiliate_core::Error),

    /// Actor is not authorized for the requested operation
    #[error("Policy error: {0}")]
    Policy(String),

    /// Disbursement gateway failure (retryable via the state machine)
    #[error("Disbursement error: {0}")]
    Disbursement(String),

    /// Scheduler configuration error
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the operation lost an optimistic pre-state check
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::Ledger(affiliate_core::Error::StaleState { .. }))
    }

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
