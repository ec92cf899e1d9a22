//! Main commission engine
//!
//! Turns qualifying upstream events (bet settled, deposit confirmed,
//! user registered) into ledger earnings, cascading the override share
//! to the sub-affiliate's master in the same logical transaction.

use crate::{hierarchy::HierarchyResolver, rates, Error, Result};
use affiliate_core::{
    AffiliateId, AffiliateStatus, EarningRecord, EarningSource, LedgerStore,
    MasterAffiliateLink,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inbound qualifying event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionEvent {
    /// Affiliate whose referred activity generated the event
    pub affiliate_id: AffiliateId,

    /// What kind of activity
    pub source_type: EarningSource,

    /// Volume the rate applies to (ignored for flat resolutions)
    pub base_amount: Decimal,

    /// Idempotency key of the upstream event
    pub source_event_id: String,
}

/// Commission engine
pub struct CommissionEngine {
    /// Ledger core
    ledger: Arc<LedgerStore>,

    /// Hierarchy resolver (sole authority on master/sub edges)
    hierarchy: HierarchyResolver,
}

impl CommissionEngine {
    /// Create new commission engine
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        let hierarchy = HierarchyResolver::new(ledger.clone());
        Self { ledger, hierarchy }
    }

    /// Hierarchy resolver for link administration
    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    /// Record the earnings for a qualifying event.
    ///
    /// Returns one record (direct) or two (direct + override to the
    /// master). Recording is at-most-once per
    /// `(affiliate, source_type, source_event_id)`; replays reject with
    /// a conflict and no balance change. The direct and override legs
    /// commit atomically; a failed override rolls the direct leg back.
    pub async fn record_earning(&self, event: CommissionEvent) -> Result<Vec<EarningRecord>> {
        if event.source_type == EarningSource::OverrideCommission {
            return Err(Error::Ledger(affiliate_core::Error::Validation(
                "override earnings are engine-generated, not inbound events".to_string(),
            )));
        }
        if event.base_amount < Decimal::ZERO {
            return Err(Error::Ledger(affiliate_core::Error::Validation(format!(
                "base amount must not be negative, got {}",
                event.base_amount
            ))));
        }

        let affiliate = self.ledger.get_affiliate(&event.affiliate_id)?;
        if affiliate.status != AffiliateStatus::Active {
            return Err(Error::Ledger(affiliate_core::Error::Validation(format!(
                "affiliate {} is not active",
                affiliate.id
            ))));
        }

        // Fast-path duplicate check; the ledger re-checks inside the
        // affiliate's serialization scope before committing.
        if let Some(existing) = self.ledger.lookup_idempotency(
            &event.affiliate_id,
            event.source_type,
            &event.source_event_id,
        )? {
            return Err(Error::Ledger(affiliate_core::Error::Conflict(format!(
                "event {} already recorded as earning {}",
                event.source_event_id, existing
            ))));
        }

        let config = affiliate.commission.as_ref().ok_or_else(|| {
            Error::Ledger(affiliate_core::Error::Validation(format!(
                "affiliate {} has no commission configuration",
                affiliate.id
            )))
        })?;

        let direct_amount = rates::direct_amount(config, event.source_type, event.base_amount)?;

        let direct = EarningRecord::new(
            event.affiliate_id.clone(),
            event.source_type,
            direct_amount,
            None,
            Some(event.source_event_id.clone()),
        );

        let override_leg = self.override_leg(&event, direct_amount)?;

        tracing::debug!(
            affiliate = %event.affiliate_id,
            source = ?event.source_type,
            direct = %direct_amount,
            has_override = override_leg.is_some(),
            "Commission computed"
        );

        Ok(self.ledger.credit(direct, override_leg).await?)
    }

    /// Build the override record for the affiliate's master, if the
    /// affiliate has one with a positive override rate.
    ///
    /// The override is computed from the direct amount, never
    /// compounded further (hierarchy depth is fixed at 1). Per-link
    /// custom rates replace the sub's own rates for the override basis
    /// only.
    fn override_leg(
        &self,
        event: &CommissionEvent,
        direct_amount: Decimal,
    ) -> Result<Option<EarningRecord>> {
        let link = match self.hierarchy.link_of(&event.affiliate_id)? {
            Some(link) => link,
            None => return Ok(None),
        };

        if link.override_commission_rate <= Decimal::ZERO {
            return Ok(None);
        }

        let basis = self.override_basis(&link, event, direct_amount);
        let amount = basis * link.override_commission_rate;
        if amount <= Decimal::ZERO {
            return Ok(None);
        }

        Ok(Some(EarningRecord::new(
            link.master_id,
            EarningSource::OverrideCommission,
            amount,
            Some(event.affiliate_id.clone()),
            Some(event.source_event_id.clone()),
        )))
    }

    fn override_basis(
        &self,
        link: &MasterAffiliateLink,
        event: &CommissionEvent,
        direct_amount: Decimal,
    ) -> Decimal {
        let custom_rate = match event.source_type {
            EarningSource::BetCommission => link.bet_rate,
            EarningSource::DepositCommission => link.deposit_rate,
            _ => None,
        };
        match custom_rate {
            Some(rate) => event.base_amount * rate,
            None => direct_amount,
        }
    }
}
