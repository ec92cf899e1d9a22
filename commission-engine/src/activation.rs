//! Activation workflow: the commission-rate-assignment gate
//!
//! Status change and rate assignment are one atomic operation, so
//! there is never a window in which an active affiliate earns at an
//! undefined rate. The acting identity is always an explicit input.

use crate::{Error, Result};
use affiliate_core::{
    Actor, ActorRole, Affiliate, AffiliateId, AffiliateStatus, CommissionConfig, LedgerStore,
};
use std::sync::Arc;

/// Activation workflow over the ledger store
pub struct ActivationWorkflow {
    ledger: Arc<LedgerStore>,
}

impl ActivationWorkflow {
    /// Create workflow over a ledger store
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    fn require_admin(actor: &Actor) -> Result<()> {
        match actor.role {
            ActorRole::Admin | ActorRole::SuperAdmin => Ok(()),
            ActorRole::Affiliate => Err(Error::Ledger(affiliate_core::Error::Validation(
                format!("actor {} is not authorized for status changes", actor.id),
            ))),
        }
    }

    /// Activate an affiliate from `Pending` or `Suspended`.
    ///
    /// A commission configuration must be supplied or already present
    /// and valid; activation with no earning component is rejected.
    pub async fn activate(
        &self,
        id: &AffiliateId,
        commission: Option<CommissionConfig>,
        actor: &Actor,
    ) -> Result<Affiliate> {
        Self::require_admin(actor)?;

        let affiliate = self
            .ledger
            .update_affiliate(id, |affiliate| match affiliate.status {
                AffiliateStatus::Pending | AffiliateStatus::Suspended => {
                    let config = commission
                        .or_else(|| affiliate.commission.clone())
                        .ok_or_else(|| {
                            affiliate_core::Error::Validation(format!(
                                "affiliate {} cannot be activated without a commission configuration",
                                affiliate.id
                            ))
                        })?;
                    config.validate()?;
                    affiliate.commission = Some(config);
                    affiliate.status = AffiliateStatus::Active;
                    Ok(())
                }
                AffiliateStatus::Active => Err(affiliate_core::Error::Conflict(format!(
                    "affiliate {} is already active",
                    affiliate.id
                ))),
                AffiliateStatus::Banned => Err(affiliate_core::Error::Validation(format!(
                    "affiliate {} is banned; reinstatement is a separate operation",
                    affiliate.id
                ))),
                AffiliateStatus::Inactive => Err(affiliate_core::Error::Validation(format!(
                    "affiliate {} is deactivated",
                    affiliate.id
                ))),
            })
            .await?;

        tracing::info!(affiliate = %id, actor = %actor.id, "Affiliate activated");
        Ok(affiliate)
    }

    /// Suspend an active affiliate (manual toggle)
    pub async fn suspend(&self, id: &AffiliateId, actor: &Actor) -> Result<Affiliate> {
        Self::require_admin(actor)?;

        let affiliate = self
            .ledger
            .update_affiliate(id, |affiliate| match affiliate.status {
                AffiliateStatus::Active => {
                    affiliate.status = AffiliateStatus::Suspended;
                    Ok(())
                }
                other => Err(affiliate_core::Error::Validation(format!(
                    "cannot suspend affiliate in status {:?}",
                    other
                ))),
            })
            .await?;

        tracing::info!(affiliate = %id, actor = %actor.id, "Affiliate suspended");
        Ok(affiliate)
    }

    /// Ban an affiliate from any non-banned state (terminal except
    /// explicit reinstatement)
    pub async fn ban(&self, id: &AffiliateId, actor: &Actor) -> Result<Affiliate> {
        Self::require_admin(actor)?;

        let affiliate = self
            .ledger
            .update_affiliate(id, |affiliate| match affiliate.status {
                AffiliateStatus::Banned => Err(affiliate_core::Error::Conflict(format!(
                    "affiliate {} is already banned",
                    affiliate.id
                ))),
                _ => {
                    affiliate.status = AffiliateStatus::Banned;
                    Ok(())
                }
            })
            .await?;

        tracing::warn!(affiliate = %id, actor = %actor.id, "Affiliate banned");
        Ok(affiliate)
    }

    /// Reinstate a banned affiliate to `Pending`.
    ///
    /// Requires an elevated actor; the affiliate then goes through the
    /// activation gate again rather than returning straight to
    /// `Active`.
    pub async fn reinstate(&self, id: &AffiliateId, actor: &Actor) -> Result<Affiliate> {
        if actor.role != ActorRole::SuperAdmin {
            return Err(Error::Ledger(affiliate_core::Error::Validation(format!(
                "reinstatement requires a super-admin actor, got {:?}",
                actor.role
            ))));
        }

        let affiliate = self
            .ledger
            .update_affiliate(id, |affiliate| match affiliate.status {
                AffiliateStatus::Banned => {
                    affiliate.status = AffiliateStatus::Pending;
                    Ok(())
                }
                other => Err(affiliate_core::Error::Validation(format!(
                    "cannot reinstate affiliate in status {:?}",
                    other
                ))),
            })
            .await?;

        tracing::warn!(affiliate = %id, actor = %actor.id, "Affiliate reinstated");
        Ok(affiliate)
    }

    /// Soft-delete an affiliate: anonymize contact details and mark
    /// `Inactive`. Ledger rows are retained for audit; only the
    /// personally identifying fields are scrubbed. Rejected while a
    /// payout is in flight.
    pub async fn deactivate(&self, id: &AffiliateId, actor: &Actor) -> Result<Affiliate> {
        Self::require_admin(actor)?;

        // The in-flight check runs inside the affiliate's serialization
        // scope: a concurrent payout request holds the same guard, so
        // one cannot slip in between the check and the status write.
        let affiliate = self
            .ledger
            .update_affiliate(id, |affiliate| {
                if let Some(payout) = self.ledger.active_payout(&affiliate.id)? {
                    return Err(affiliate_core::Error::Conflict(format!(
                        "affiliate {} has payout {} in flight",
                        affiliate.id, payout
                    )));
                }
                match affiliate.status {
                    AffiliateStatus::Inactive => Err(affiliate_core::Error::Conflict(format!(
                        "affiliate {} is already deactivated",
                        affiliate.id
                    ))),
                    _ => {
                        affiliate.display_name = format!("deleted-{}", affiliate.id);
                        affiliate.contact_email = String::new();
                        affiliate.status = AffiliateStatus::Inactive;
                        Ok(())
                    }
                }
            })
            .await?;

        tracing::info!(affiliate = %id, actor = %actor.id, "Affiliate deactivated");
        Ok(affiliate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affiliate_core::{
        CommissionType, Config, Currency, EarningRecord, EarningSource, PaymentMethod,
        PayoutConfig, PayoutRequest, PayoutSchedule, PayoutStatus,
    };
    use rust_decimal::Decimal;

    async fn setup(code: &str) -> (ActivationWorkflow, Arc<LedgerStore>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let ledger = Arc::new(LedgerStore::open(&config).unwrap());

        ledger
            .create_affiliate(Affiliate::register(
                AffiliateId::new(code),
                "Test",
                "test@example.com",
                PayoutConfig {
                    payment_method: PaymentMethod::BankTransfer,
                    minimum_payout: Decimal::new(10000, 2),
                    payout_schedule: PayoutSchedule::Monthly,
                    auto_payout: false,
                },
                Currency::USD,
            ))
            .await
            .unwrap();

        (ActivationWorkflow::new(ledger.clone()), ledger, temp_dir)
    }

    fn hybrid_config() -> CommissionConfig {
        CommissionConfig {
            commission_type: CommissionType::Hybrid,
            bet_rate: Decimal::new(5, 2),
            deposit_rate: Decimal::new(2, 2),
            cpa_flat_amount: Decimal::ZERO,
        }
    }

    fn admin() -> Actor {
        Actor::new("admin-1", ActorRole::Admin)
    }

    #[tokio::test]
    async fn test_activation_requires_commission_config() {
        let (workflow, _ledger, _temp) = setup("A").await;

        let result = workflow
            .activate(&AffiliateId::new("A"), None, &admin())
            .await;
        assert!(result.is_err());

        let affiliate = workflow
            .activate(&AffiliateId::new("A"), Some(hybrid_config()), &admin())
            .await
            .unwrap();
        assert_eq!(affiliate.status, AffiliateStatus::Active);
        assert!(affiliate.commission.is_some());
    }

    #[tokio::test]
    async fn test_suspend_and_reactivate_keeps_config() {
        let (workflow, _ledger, _temp) = setup("B").await;
        let id = AffiliateId::new("B");

        workflow
            .activate(&id, Some(hybrid_config()), &admin())
            .await
            .unwrap();
        let affiliate = workflow.suspend(&id, &admin()).await.unwrap();
        assert_eq!(affiliate.status, AffiliateStatus::Suspended);

        // Config already present: reactivation without supplying one
        let affiliate = workflow.activate(&id, None, &admin()).await.unwrap();
        assert_eq!(affiliate.status, AffiliateStatus::Active);
    }

    #[tokio::test]
    async fn test_banned_requires_super_admin_reinstate() {
        let (workflow, _ledger, _temp) = setup("C").await;
        let id = AffiliateId::new("C");

        workflow.ban(&id, &admin()).await.unwrap();

        // Activation from banned is never allowed
        let result = workflow.activate(&id, Some(hybrid_config()), &admin()).await;
        assert!(result.is_err());

        // Plain admin cannot reinstate
        let result = workflow.reinstate(&id, &admin()).await;
        assert!(result.is_err());

        // Super-admin reinstates back to pending, not active
        let super_admin = Actor::new("root", ActorRole::SuperAdmin);
        let affiliate = workflow.reinstate(&id, &super_admin).await.unwrap();
        assert_eq!(affiliate.status, AffiliateStatus::Pending);
    }

    #[tokio::test]
    async fn test_affiliate_actor_cannot_change_status() {
        let (workflow, _ledger, _temp) = setup("D").await;
        let actor = Actor::new("aff-d", ActorRole::Affiliate);

        let result = workflow
            .activate(&AffiliateId::new("D"), Some(hybrid_config()), &actor)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_deactivate_anonymizes_and_is_final() {
        let (workflow, ledger, _temp) = setup("E").await;
        let id = AffiliateId::new("E");

        let affiliate = workflow.deactivate(&id, &admin()).await.unwrap();
        assert_eq!(affiliate.status, AffiliateStatus::Inactive);
        assert_eq!(affiliate.display_name, "deleted-E");
        assert!(affiliate.contact_email.is_empty());

        // Ledger record survives the scrub
        assert!(ledger.get_affiliate(&id).is_ok());

        // Second deactivation and reactivation both reject
        assert!(workflow.deactivate(&id, &admin()).await.is_err());
        assert!(workflow
            .activate(&id, Some(hybrid_config()), &admin())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_deactivate_rejects_with_payout_in_flight() {
        let (workflow, ledger, _temp) = setup("F").await;
        let id = AffiliateId::new("F");

        ledger
            .credit(
                EarningRecord::new(
                    id.clone(),
                    EarningSource::BetCommission,
                    Decimal::new(50000, 2),
                    None,
                    None,
                ),
                None,
            )
            .await
            .unwrap();
        let payout = ledger
            .open_payout(PayoutRequest::new(
                id.clone(),
                Decimal::new(30000, 2),
                Currency::USD,
                3,
            ))
            .await
            .unwrap();

        let result = workflow.deactivate(&id, &admin()).await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(
            ledger.get_affiliate(&id).unwrap().status,
            AffiliateStatus::Pending
        );

        // Once the payout reaches a terminal state the scrub goes through
        ledger
            .transition_payout(payout.id, PayoutStatus::Pending, |p| {
                p.status = PayoutStatus::Cancelled;
                Ok(())
            })
            .await
            .unwrap();
        let affiliate = workflow.deactivate(&id, &admin()).await.unwrap();
        assert_eq!(affiliate.status, AffiliateStatus::Inactive);
    }
}
