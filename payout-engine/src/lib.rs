//! Payout Engine
//!
//! Drives payout requests through their lifecycle against the ledger:
//!
//! ```text
//! Pending -> Processing -> Completed
//! Pending -> Cancelled
//! Processing -> OnHold -> Processing | Cancelled
//! Pending | Processing -> Failed -> Pending   (while retry budget remains)
//! Failed -> Cancelled                         (manual resolution)
//! ```
//!
//! Every transition is an optimistic compare-and-swap: callers name
//! the state they observed, and a concurrent change rejects with a
//! stale-state error rather than applying twice. Funds move exactly
//! once, at completion, when the ledger atomically shifts the amount
//! from pending to paid and marks the covered earnings oldest-first.
//!
//! External money movement goes through the [`disbursement::Disbursement`]
//! trait; [`scheduler::AutoPayoutScheduler`] sweeps opted-in affiliates
//! at configured UTC windows.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod disbursement;
pub mod engine;
pub mod error;
pub mod retry;
pub mod scheduler;

// Re-exports
pub use disbursement::{Disbursement, DisbursementReceipt, DisbursementStatus, MockDisbursement};
pub use engine::{PayoutEngine, PayoutPolicy};
pub use error::{Error, Result};
pub use retry::RetryConfig;
pub use scheduler::{AutoPayoutScheduler, ScheduleConfig, SweepReport};
