//! Affiliate Core
//!
//! Durable ledger of affiliate earnings and payouts with per-affiliate
//! serialization of balance mutations.
//!
//! # Architecture
//!
//! - **Append-mostly ledger**: earning and payout records are created
//!   once and only their status ever changes
//! - **Balance snapshots**: every affiliate carries running totals
//!   backed by the ledger rows
//! - **Per-affiliate serialization**: a commission credit and a payout
//!   debit on the same affiliate never interleave
//! - **Atomic commits**: multi-record mutations go through a single
//!   RocksDB write batch
//!
//! # Invariants
//!
//! - `total_earnings == pending_earnings + paid_earnings` for every
//!   affiliate after every operation
//! - At most one non-terminal payout request per affiliate
//! - Earning amounts are immutable; only status flips pending → paid

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::LedgerStore;
pub use storage::Storage;
pub use types::{
    Actor, ActorRole, Affiliate, AffiliateId, AffiliateStatus, CommissionConfig, CommissionType,
    Currency, EarningRecord, EarningSource, EarningStatus, MasterAffiliateLink, PaymentMethod,
    PayoutConfig, PayoutRequest, PayoutSchedule, PayoutStatus, VerificationStatus,
};
