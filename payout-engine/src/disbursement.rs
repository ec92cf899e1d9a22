//! Disbursement gateway abstraction
//!
//! The engine drives external money movement through the [`Disbursement`]
//! trait; the trait boundary keeps gateway specifics (and their test
//! doubles) out of the state machine. Implementations must be
//! idempotent per payout id: re-submitting a payout the gateway has
//! already accepted returns the original transaction reference.

use crate::{Error, Result};
use affiliate_core::{PaymentMethod, PayoutRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of a disbursement attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DisbursementStatus {
    /// Funds accepted by the gateway
    Accepted,
    /// Gateway rejected the transfer
    Rejected,
}

/// Gateway receipt for an accepted or rejected transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementReceipt {
    /// External transaction reference
    pub transaction_id: String,
    /// Terminal gateway status for this attempt
    pub status: DisbursementStatus,
    /// Rejection detail, when rejected
    pub reason: Option<String>,
    /// When the gateway answered
    pub responded_at: DateTime<Utc>,
}

impl DisbursementReceipt {
    /// Whether the gateway accepted the transfer
    pub fn is_accepted(&self) -> bool {
        self.status == DisbursementStatus::Accepted
    }
}

/// External payment gateway
#[async_trait]
pub trait Disbursement: Send + Sync {
    /// Submit a payout for external transfer.
    ///
    /// Must be idempotent per `payout.id`: a resubmission after a
    /// crash returns the receipt of the first accepted attempt rather
    /// than moving money twice.
    async fn disburse(&self, payout: &PayoutRequest) -> Result<DisbursementReceipt>;

    /// Whether the gateway supports the payment method
    fn supports(&self, method: PaymentMethod) -> bool;
}

#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Accept,
    Reject(String),
    Unreachable(String),
}

/// In-memory gateway double with scripted outcomes.
///
/// Outcomes are consumed in order; once the script is exhausted every
/// further submission is accepted. Receipts are retained per payout id
/// so resubmissions observe the idempotency contract.
pub struct MockDisbursement {
    script: Mutex<Vec<ScriptedOutcome>>,
    receipts: Mutex<HashMap<Uuid, DisbursementReceipt>>,
}

impl MockDisbursement {
    /// Gateway that accepts everything
    pub fn accepting() -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a rejection for the next unseen payout
    pub fn push_rejection(&self, reason: impl Into<String>) {
        self.script
            .lock()
            .push(ScriptedOutcome::Reject(reason.into()));
    }

    /// Queue a transport failure for the next unseen payout
    pub fn push_unreachable(&self, reason: impl Into<String>) {
        self.script
            .lock()
            .push(ScriptedOutcome::Unreachable(reason.into()));
    }

    /// Number of receipts issued so far
    pub fn receipt_count(&self) -> usize {
        self.receipts.lock().len()
    }
}

#[async_trait]
impl Disbursement for MockDisbursement {
    async fn disburse(&self, payout: &PayoutRequest) -> Result<DisbursementReceipt> {
        if let Some(receipt) = self.receipts.lock().get(&payout.id) {
            tracing::debug!(payout = %payout.id, "Replaying stored receipt");
            return Ok(receipt.clone());
        }

        let outcome = {
            let mut script = self.script.lock();
            if script.is_empty() {
                ScriptedOutcome::Accept
            } else {
                script.remove(0)
            }
        };

        let receipt = match outcome {
            ScriptedOutcome::Accept => DisbursementReceipt {
                transaction_id: format!("mock-txn-{}", payout.id.simple()),
                status: DisbursementStatus::Accepted,
                reason: None,
                responded_at: Utc::now(),
            },
            ScriptedOutcome::Reject(reason) => DisbursementReceipt {
                transaction_id: format!("mock-txn-{}", payout.id.simple()),
                status: DisbursementStatus::Rejected,
                reason: Some(reason),
                responded_at: Utc::now(),
            },
            ScriptedOutcome::Unreachable(reason) => {
                return Err(Error::Disbursement(reason));
            }
        };

        self.receipts.lock().insert(payout.id, receipt.clone());
        Ok(receipt)
    }

    fn supports(&self, _method: PaymentMethod) -> bool {
        true
    }
}
