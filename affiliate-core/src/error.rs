//! Error types for the affiliate core

use crate::types::PayoutStatus;
use thiserror::Error;

/// Result type for affiliate core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Affiliate core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate or conflicting operation, no partial effect.
    /// Callers should treat this as "already done" rather than retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Optimistic-lock mismatch on a payout transition. The caller
    /// must re-fetch current state and decide whether to reapply.
    #[error("Stale state: expected {expected:?}, found {actual:?}")]
    StaleState {
        /// Status the caller expected to transition from
        expected: PayoutStatus,
        /// Status actually found
        actual: PayoutStatus,
    },

    /// Requested amount exceeds pending earnings (user-facing)
    #[error("Insufficient balance: requested {requested}, pending {available}")]
    InsufficientBalance {
        /// Amount the caller asked for
        requested: rust_decimal::Decimal,
        /// Pending earnings actually available
        available: rust_decimal::Decimal,
    },

    /// External disbursement collaborator failed
    #[error("Disbursement error: {0}")]
    Disbursement(String),

    /// Affiliate not found
    #[error("Affiliate not found: {0}")]
    AffiliateNotFound(String),

    /// Earning record not found
    #[error("Earning record not found: {0}")]
    EarningNotFound(String),

    /// Payout request not found
    #[error("Payout request not found: {0}")]
    PayoutNotFound(String),

    /// Invariant violation (balance consistency, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (lock poisoned, channel closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
