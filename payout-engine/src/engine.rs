//! Payout state machine operations
//!
//! Every operation is an optimistic compare-and-transition against the
//! ledger: the caller names the state it believes the payout is in,
//! and a mismatch rejects with a stale-state error instead of applying
//! a double effect. Balance movement happens exactly once, at
//! completion, inside the ledger's atomic settle.

use crate::disbursement::Disbursement;
use crate::retry::RetryConfig;
use crate::{Error, Result};
use affiliate_core::{
    Actor, ActorRole, AffiliateId, AffiliateStatus, Currency, LedgerStore, PayoutRequest,
    PayoutStatus,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Payout engine policy knobs
#[derive(Debug, Clone)]
pub struct PayoutPolicy {
    /// Retry budget stamped on new requests
    pub max_retries: u32,
    /// Backoff spacing between retries
    pub retry: RetryConfig,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry: RetryConfig::default(),
        }
    }
}

/// Payout state machine over the ledger store
pub struct PayoutEngine {
    ledger: Arc<LedgerStore>,
    policy: PayoutPolicy,
}

impl PayoutEngine {
    /// Create an engine with the default policy
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self::with_policy(ledger, PayoutPolicy::default())
    }

    /// Create an engine with an explicit policy
    pub fn with_policy(ledger: Arc<LedgerStore>, policy: PayoutPolicy) -> Self {
        Self { ledger, policy }
    }

    /// The backoff delay to wait before retrying `payout`
    pub fn retry_delay(&self, payout: &PayoutRequest) -> std::time::Duration {
        self.policy.retry.delay_for(payout.retry_attempt)
    }

    fn require_admin(actor: &Actor) -> Result<()> {
        match actor.role {
            ActorRole::Admin | ActorRole::SuperAdmin => Ok(()),
            ActorRole::Affiliate => Err(Error::Policy(format!(
                "actor {} is not authorized for payout processing",
                actor.id
            ))),
        }
    }

    /// Affiliates may act on their own payouts; admins on any.
    fn require_self_or_admin(actor: &Actor, affiliate_id: &AffiliateId) -> Result<()> {
        match actor.role {
            ActorRole::Admin | ActorRole::SuperAdmin => Ok(()),
            ActorRole::Affiliate if actor.id == affiliate_id.as_str() => Ok(()),
            ActorRole::Affiliate => Err(Error::Policy(format!(
                "actor {} cannot act on payouts of {}",
                actor.id, affiliate_id
            ))),
        }
    }

    /// Open a payout request against the affiliate's pending earnings.
    ///
    /// Enforced here: the affiliate is active, the amount meets their
    /// configured minimum, and the amount is covered by pending
    /// earnings. The ledger additionally rejects a second live request
    /// for the same affiliate.
    pub async fn request(
        &self,
        affiliate_id: &AffiliateId,
        amount: Decimal,
        currency: Currency,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        Self::require_self_or_admin(actor, affiliate_id)?;

        let affiliate = self.ledger.get_affiliate(affiliate_id)?;
        if affiliate.status != AffiliateStatus::Active {
            return Err(affiliate_core::Error::Validation(format!(
                "affiliate {} is not active",
                affiliate.id
            ))
            .into());
        }
        if currency != affiliate.currency {
            return Err(affiliate_core::Error::Validation(format!(
                "payout currency {} does not match affiliate currency {}",
                currency, affiliate.currency
            ))
            .into());
        }
        if amount < affiliate.payout.minimum_payout {
            return Err(affiliate_core::Error::Validation(format!(
                "amount {} is below the minimum payout {}",
                amount, affiliate.payout.minimum_payout
            ))
            .into());
        }

        let payout = PayoutRequest::new(
            affiliate_id.clone(),
            amount,
            currency,
            self.policy.max_retries,
        );
        Ok(self.ledger.open_payout(payout).await?)
    }

    /// Look up a payout request
    pub fn get(&self, id: Uuid) -> Result<PayoutRequest> {
        Ok(self.ledger.get_payout(id)?)
    }

    /// Begin processing a pending payout (`Pending` → `Processing`)
    pub async fn process(
        &self,
        id: Uuid,
        note: Option<String>,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;
        let payout = self
            .ledger
            .transition_payout(id, PayoutStatus::Pending, |payout| {
                payout.status = PayoutStatus::Processing;
                payout.processed_at = Some(Utc::now());
                if let Some(note) = note {
                    payout.notes.push(note);
                }
                Ok(())
            })
            .await?;
        Ok(payout)
    }

    /// Complete a processing payout with the gateway's transaction
    /// reference (`Processing` → `Completed`). Moves the amount from
    /// pending to paid and marks the covered earnings.
    pub async fn complete(
        &self,
        id: Uuid,
        transaction_id: impl Into<String>,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;
        Ok(self.ledger.settle_payout(id, transaction_id.into()).await?)
    }

    /// Record a disbursement failure (`Pending` or `Processing` →
    /// `Failed`). Balances are untouched; the request keeps its claim
    /// on the affiliate's active slot until retried or cancelled.
    pub async fn fail(
        &self,
        id: Uuid,
        expected: PayoutStatus,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;
        let reason = reason.into();
        let payout = self
            .ledger
            .transition_payout(id, expected, |payout| {
                payout.status = PayoutStatus::Failed;
                payout.failure_reason = Some(reason.clone());
                Ok(())
            })
            .await?;
        tracing::warn!(
            payout = %payout.id,
            reason = payout.failure_reason.as_deref().unwrap_or(""),
            attempt = payout.retry_attempt,
            "Payout failed"
        );
        Ok(payout)
    }

    /// Re-queue a failed payout (`Failed` → `Pending`), consuming one
    /// unit of its retry budget. Rejected once the budget is spent.
    pub async fn retry(&self, id: Uuid, actor: &Actor) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;
        let payout = self
            .ledger
            .transition_payout(id, PayoutStatus::Failed, |payout| {
                if payout.retry_attempt >= payout.max_retries {
                    return Err(affiliate_core::Error::Validation(format!(
                        "payout {} exhausted its retry budget ({}/{})",
                        payout.id, payout.retry_attempt, payout.max_retries
                    )));
                }
                payout.retry_attempt += 1;
                payout.status = PayoutStatus::Pending;
                payout.failure_reason = None;
                Ok(())
            })
            .await?;
        Ok(payout)
    }

    /// Park a processing payout for manual review (`Processing` → `OnHold`)
    pub async fn hold(
        &self,
        id: Uuid,
        note: impl Into<String>,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;
        let note = note.into();
        let payout = self
            .ledger
            .transition_payout(id, PayoutStatus::Processing, |payout| {
                payout.status = PayoutStatus::OnHold;
                payout.notes.push(note.clone());
                Ok(())
            })
            .await?;
        Ok(payout)
    }

    /// Resume a held payout (`OnHold` → `Processing`)
    pub async fn resume(&self, id: Uuid, actor: &Actor) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;
        let payout = self
            .ledger
            .transition_payout(id, PayoutStatus::OnHold, |payout| {
                payout.status = PayoutStatus::Processing;
                Ok(())
            })
            .await?;
        Ok(payout)
    }

    /// Abandon a payout before funds moved (`Pending`, `OnHold` or
    /// `Failed` → `Cancelled`). Cancelling from `Failed` is the manual
    /// resolution for an exhausted retry budget. Releases the
    /// affiliate's active slot; the pending earnings stay pending.
    pub async fn cancel(
        &self,
        id: Uuid,
        expected: PayoutStatus,
        note: impl Into<String>,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        let payout = self.ledger.get_payout(id)?;
        Self::require_self_or_admin(actor, &payout.affiliate_id)?;

        let note = note.into();
        let payout = self
            .ledger
            .transition_payout(id, expected, |payout| {
                payout.status = PayoutStatus::Cancelled;
                payout.notes.push(note.clone());
                Ok(())
            })
            .await?;
        Ok(payout)
    }

    /// Drive one payout through the gateway end to end.
    ///
    /// `Pending` → `Processing`, then submit through the gateway:
    /// an accepted receipt settles the payout, a rejected receipt or
    /// transport failure records a `Failed` with the reason. Returns
    /// the payout in its resulting state.
    pub async fn disburse_and_settle(
        &self,
        id: Uuid,
        gateway: &dyn Disbursement,
        actor: &Actor,
    ) -> Result<PayoutRequest> {
        Self::require_admin(actor)?;

        let payout = self.process(id, None, actor).await?;

        let affiliate = self.ledger.get_affiliate(&payout.affiliate_id)?;
        if !gateway.supports(affiliate.payout.payment_method) {
            return self
                .fail(id, PayoutStatus::Processing, "payment method unsupported by gateway", actor)
                .await;
        }

        match gateway.disburse(&payout).await {
            Ok(receipt) if receipt.is_accepted() => {
                self.complete(id, receipt.transaction_id, actor).await
            }
            Ok(receipt) => {
                let reason = receipt
                    .reason
                    .unwrap_or_else(|| "rejected by gateway".to_string());
                self.fail(id, PayoutStatus::Processing, reason, actor).await
            }
            Err(err) => {
                self.fail(id, PayoutStatus::Processing, err.to_string(), actor)
                    .await
            }
        }
    }
}
