//! Commission Engine
//!
//! Computes the commission owed for qualifying events (bets, deposits,
//! registrations) and cascades the override share one level up the
//! affiliate hierarchy.
//!
//! # Flow
//!
//! 1. **Resolve**: pick the applicable rate from the affiliate's
//!    commission configuration and the event source
//! 2. **Cascade**: consult the hierarchy resolver; build the override
//!    leg for the master, if any
//! 3. **Commit**: both legs and all balance increments land in one
//!    atomic ledger credit
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use affiliate_core::{AffiliateId, Config, EarningSource, LedgerStore};
//! use commission_engine::{CommissionEngine, CommissionEvent};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> commission_engine::Result<()> {
//!     let ledger = Arc::new(LedgerStore::open(&Config::default())?);
//!     let engine = CommissionEngine::new(ledger);
//!
//!     let records = engine.record_earning(CommissionEvent {
//!         affiliate_id: AffiliateId::new("AFF001"),
//!         source_type: EarningSource::BetCommission,
//!         base_amount: Decimal::new(100000, 2),
//!         source_event_id: "bet-8812".to_string(),
//!     }).await?;
//!     println!("recorded {} earning(s)", records.len());
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod activation;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod rates;

// Re-exports
pub use activation::ActivationWorkflow;
pub use engine::{CommissionEngine, CommissionEvent};
pub use error::{Error, Result};
pub use hierarchy::{HierarchyResolver, LinkTerms};
