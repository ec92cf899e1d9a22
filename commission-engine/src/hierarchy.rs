//! Hierarchy resolver: the sole authority on master/sub relationships
//!
//! The hierarchy is a set of directed edges sub → master with depth
//! capped at 1. Rather than scattering cycle checks across callers,
//! every link mutation goes through this resolver; the commission
//! engine only ever reads.

use crate::{Error, Result};
use affiliate_core::{AffiliateId, LedgerStore, MasterAffiliateLink};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Override terms for a new master/sub link
#[derive(Debug, Clone)]
pub struct LinkTerms {
    /// Share of the sub's direct earning paid to the master (0..=1)
    pub override_commission_rate: Decimal,
    /// Custom bet rate for the override basis (defaults to the sub's own)
    pub bet_rate: Option<Decimal>,
    /// Custom deposit rate for the override basis
    pub deposit_rate: Option<Decimal>,
}

/// Resolver over the durable link collection
pub struct HierarchyResolver {
    ledger: Arc<LedgerStore>,
}

impl HierarchyResolver {
    /// Create resolver over a ledger store
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Link a sub-affiliate under a master.
    ///
    /// Rejects self-links, relinks (an existing master must be
    /// explicitly unlinked first, never silently overwritten) and any
    /// edge that would push the hierarchy past depth 1, which is also
    /// what makes cycles impossible.
    pub fn link_sub_affiliate(
        &self,
        master_id: &AffiliateId,
        sub_id: &AffiliateId,
        terms: LinkTerms,
    ) -> Result<MasterAffiliateLink> {
        if master_id == sub_id {
            return Err(Error::Ledger(affiliate_core::Error::Conflict(format!(
                "affiliate {} cannot be its own master",
                sub_id
            ))));
        }

        // Both ends must exist
        self.ledger.get_affiliate(master_id)?;
        self.ledger.get_affiliate(sub_id)?;

        if let Some(existing) = self.ledger.get_link(sub_id)? {
            if existing.master_id == *master_id {
                return Err(Error::Ledger(affiliate_core::Error::Conflict(format!(
                    "{} is already linked under {}",
                    sub_id, master_id
                ))));
            }
            return Err(Error::Hierarchy(format!(
                "{} already has master {}; unlink first",
                sub_id, existing.master_id
            )));
        }

        // Depth cap: a sub with its own subs, or a master that is
        // itself a sub, would create a two-level chain.
        if self.ledger.has_subs(sub_id)? {
            return Err(Error::Hierarchy(format!(
                "{} has sub-affiliates of its own and cannot become a sub",
                sub_id
            )));
        }
        if let Some(grand) = self.ledger.master_of(master_id)? {
            return Err(Error::Hierarchy(format!(
                "{} is itself a sub of {} and cannot act as a master",
                master_id, grand
            )));
        }

        let link = MasterAffiliateLink {
            master_id: master_id.clone(),
            sub_id: sub_id.clone(),
            override_commission_rate: terms.override_commission_rate,
            bet_rate: terms.bet_rate,
            deposit_rate: terms.deposit_rate,
            linked_at: Utc::now(),
        };
        link.validate()?;

        self.ledger.put_link(&link)?;
        tracing::info!(
            master = %master_id,
            sub = %sub_id,
            override_rate = %link.override_commission_rate,
            "Sub-affiliate linked"
        );
        Ok(link)
    }

    /// Remove the sub-affiliate's master link
    pub fn unlink_sub_affiliate(&self, sub_id: &AffiliateId) -> Result<()> {
        let link = self.ledger.get_link(sub_id)?.ok_or_else(|| {
            Error::Hierarchy(format!("{} has no master link to remove", sub_id))
        })?;

        self.ledger.delete_link(&link)?;
        tracing::info!(master = %link.master_id, sub = %sub_id, "Sub-affiliate unlinked");
        Ok(())
    }

    /// The sub-affiliate's master, if any (pure point lookup)
    pub fn master_of(&self, sub_id: &AffiliateId) -> Result<Option<AffiliateId>> {
        Ok(self.ledger.master_of(sub_id)?)
    }

    /// The full link record for a sub-affiliate
    pub fn link_of(&self, sub_id: &AffiliateId) -> Result<Option<MasterAffiliateLink>> {
        Ok(self.ledger.get_link(sub_id)?)
    }

    /// Sub-affiliates of a master
    pub fn subs_of(&self, master_id: &AffiliateId) -> Result<Vec<AffiliateId>> {
        Ok(self.ledger.subs_of(master_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affiliate_core::{
        Affiliate, Config, Currency, PaymentMethod, PayoutConfig, PayoutSchedule,
    };

    fn terms(rate: Decimal) -> LinkTerms {
        LinkTerms {
            override_commission_rate: rate,
            bet_rate: None,
            deposit_rate: None,
        }
    }

    async fn setup(codes: &[&str]) -> (HierarchyResolver, Arc<LedgerStore>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let ledger = Arc::new(LedgerStore::open(&config).unwrap());

        for code in codes {
            ledger
                .create_affiliate(Affiliate::register(
                    AffiliateId::new(*code),
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
        }

        (HierarchyResolver::new(ledger.clone()), ledger, temp_dir)
    }

    #[tokio::test]
    async fn test_link_and_lookup() {
        let (resolver, _ledger, _temp) = setup(&["M", "S"]).await;
        let rate = Decimal::new(10, 2);

        resolver
            .link_sub_affiliate(&AffiliateId::new("M"), &AffiliateId::new("S"), terms(rate))
            .unwrap();

        assert_eq!(
            resolver.master_of(&AffiliateId::new("S")).unwrap(),
            Some(AffiliateId::new("M"))
        );
        assert_eq!(
            resolver.subs_of(&AffiliateId::new("M")).unwrap(),
            vec![AffiliateId::new("S")]
        );
    }

    #[tokio::test]
    async fn test_self_link_rejected() {
        let (resolver, _ledger, _temp) = setup(&["A"]).await;
        let result = resolver.link_sub_affiliate(
            &AffiliateId::new("A"),
            &AffiliateId::new("A"),
            terms(Decimal::new(10, 2)),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_relink_requires_explicit_unlink() {
        let (resolver, _ledger, _temp) = setup(&["M1", "M2", "S"]).await;
        let rate = Decimal::new(10, 2);

        resolver
            .link_sub_affiliate(&AffiliateId::new("M1"), &AffiliateId::new("S"), terms(rate))
            .unwrap();

        // Different master without unlink: rejected
        let result = resolver.link_sub_affiliate(
            &AffiliateId::new("M2"),
            &AffiliateId::new("S"),
            terms(rate),
        );
        assert!(matches!(result, Err(Error::Hierarchy(_))));

        // Same master again: conflict ("already done")
        let result = resolver.link_sub_affiliate(
            &AffiliateId::new("M1"),
            &AffiliateId::new("S"),
            terms(rate),
        );
        assert!(result.unwrap_err().is_conflict());

        // After unlink, relinking works
        resolver.unlink_sub_affiliate(&AffiliateId::new("S")).unwrap();
        resolver
            .link_sub_affiliate(&AffiliateId::new("M2"), &AffiliateId::new("S"), terms(rate))
            .unwrap();
    }

    #[tokio::test]
    async fn test_depth_cap_blocks_chains_and_cycles() {
        let (resolver, _ledger, _temp) = setup(&["A", "B", "C"]).await;
        let rate = Decimal::new(10, 2);

        // A is master of B
        resolver
            .link_sub_affiliate(&AffiliateId::new("A"), &AffiliateId::new("B"), terms(rate))
            .unwrap();

        // B (a sub) cannot act as master of C
        let result = resolver.link_sub_affiliate(
            &AffiliateId::new("B"),
            &AffiliateId::new("C"),
            terms(rate),
        );
        assert!(matches!(result, Err(Error::Hierarchy(_))));

        // A (a master with subs) cannot become a sub of C
        let result = resolver.link_sub_affiliate(
            &AffiliateId::new("C"),
            &AffiliateId::new("A"),
            terms(rate),
        );
        assert!(matches!(result, Err(Error::Hierarchy(_))));

        // Direct cycle B -> A is blocked the same way
        let result = resolver.link_sub_affiliate(
            &AffiliateId::new("B"),
            &AffiliateId::new("A"),
            terms(rate),
        );
        assert!(result.is_err());
    }
}
