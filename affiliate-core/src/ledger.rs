//! Ledger store: the single authority for balance mutations
//!
//! Every operation that touches an affiliate's balances runs inside
//! that affiliate's mutual-exclusion scope, so a commission credit and
//! a payout debit against the same affiliate can never interleave into
//! an inconsistent snapshot. Reads outside the scope are snapshots and
//! never block writers.
//!
//! The store validates state preconditions itself (idempotency,
//! active-payout slot, balance sufficiency, payout pre-state); business
//! policy (rates, minimums, roles) lives in the engine crates.

use crate::{
    metrics::Metrics,
    storage::Storage,
    types::{
        Affiliate, AffiliateId, EarningRecord, EarningSource, EarningStatus, MasterAffiliateLink,
        PayoutRequest, PayoutStatus,
    },
    Config, Error, Result,
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Durable ledger store with per-affiliate serialization
pub struct LedgerStore {
    /// Storage backend
    storage: Arc<Storage>,

    /// Per-affiliate mutual-exclusion scopes
    locks: DashMap<AffiliateId, Arc<Mutex<()>>>,

    /// Prometheus metrics
    metrics: Metrics,
}

impl LedgerStore {
    /// Open the ledger store with configuration
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(config)?);
        let metrics = Metrics::new().map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            storage,
            locks: DashMap::new(),
            metrics,
        })
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn lock_for(&self, id: &AffiliateId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn guard(&self, id: &AffiliateId) -> OwnedMutexGuard<()> {
        self.lock_for(id).lock_owned().await
    }

    /// Acquire guards for two affiliates in ID order (deadlock-free)
    async fn guard_pair(
        &self,
        a: &AffiliateId,
        b: &AffiliateId,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        if a == b {
            return (self.guard(a).await, None);
        }
        if a < b {
            let ga = self.guard(a).await;
            let gb = self.guard(b).await;
            (ga, Some(gb))
        } else {
            let gb = self.guard(b).await;
            let ga = self.guard(a).await;
            (ga, Some(gb))
        }
    }

    // Affiliate operations

    /// Register a new affiliate (conflict if the code is taken)
    pub async fn create_affiliate(&self, affiliate: Affiliate) -> Result<Affiliate> {
        affiliate.payout.validate()?;
        if let Some(ref commission) = affiliate.commission {
            commission.validate()?;
        }

        let _guard = self.guard(&affiliate.id).await;

        if self.storage.affiliate_exists(&affiliate.id)? {
            return Err(Error::Conflict(format!(
                "affiliate code {} already registered",
                affiliate.id
            )));
        }

        self.storage.put_affiliate(&affiliate)?;
        tracing::info!(affiliate = %affiliate.id, "Affiliate registered");
        Ok(affiliate)
    }

    /// Snapshot read of an affiliate
    pub fn get_affiliate(&self, id: &AffiliateId) -> Result<Affiliate> {
        self.storage.get_affiliate(id)
    }

    /// Read-modify-write an affiliate under its serialization scope.
    ///
    /// The closure sees the freshest snapshot; the balance invariant is
    /// checked before the write lands.
    pub async fn update_affiliate<F>(&self, id: &AffiliateId, f: F) -> Result<Affiliate>
    where
        F: FnOnce(&mut Affiliate) -> Result<()>,
    {
        let _guard = self.guard(id).await;

        let mut affiliate = self.storage.get_affiliate(id)?;
        f(&mut affiliate)?;
        affiliate.updated_at = Utc::now();
        affiliate.check_balance_invariant()?;
        self.storage.put_affiliate(&affiliate)?;
        Ok(affiliate)
    }

    /// Snapshot of all affiliates (auto-payout sweep)
    pub fn list_affiliates(&self) -> Result<Vec<Affiliate>> {
        self.storage.list_affiliates()
    }

    // Earning operations

    /// Look up an already-recorded earning by idempotency key
    pub fn lookup_idempotency(
        &self,
        affiliate_id: &AffiliateId,
        source_type: EarningSource,
        source_event_id: &str,
    ) -> Result<Option<Uuid>> {
        self.storage
            .lookup_idempotency(affiliate_id, source_type, source_event_id)
    }

    /// Get earning record by ID
    pub fn get_earning(&self, id: Uuid) -> Result<EarningRecord> {
        self.storage.get_earning(id)
    }

    /// Pending earnings for an affiliate, oldest first
    pub fn pending_earnings(&self, affiliate_id: &AffiliateId) -> Result<Vec<EarningRecord>> {
        self.storage.pending_earnings_fifo(affiliate_id)
    }

    /// Credit a direct earning and its optional override leg.
    ///
    /// Both records, both balance bumps and all index entries land in
    /// one atomic commit; if the override cannot be applied, nothing
    /// is. The idempotency key is re-checked inside the serialization
    /// scope, so a concurrently retried upstream event cannot
    /// double-credit.
    pub async fn credit(
        &self,
        direct: EarningRecord,
        override_leg: Option<EarningRecord>,
    ) -> Result<Vec<EarningRecord>> {
        for record in std::iter::once(&direct).chain(override_leg.iter()) {
            if record.amount <= Decimal::ZERO {
                return Err(Error::Validation(format!(
                    "earning amount must be > 0, got {}",
                    record.amount
                )));
            }
        }

        let guards = match override_leg {
            Some(ref o) => self.guard_pair(&direct.affiliate_id, &o.affiliate_id).await,
            None => (self.guard(&direct.affiliate_id).await, None),
        };

        // Idempotency: at most once per (affiliate, source, event)
        for record in std::iter::once(&direct).chain(override_leg.iter()) {
            if let Some(ref event_id) = record.source_event_id {
                if let Some(existing) = self.storage.lookup_idempotency(
                    &record.affiliate_id,
                    record.source_type,
                    event_id,
                )? {
                    return Err(Error::Conflict(format!(
                        "event {} already recorded for {} as earning {}",
                        event_id, record.affiliate_id, existing
                    )));
                }
            }
        }

        let mut beneficiary = self.storage.get_affiliate(&direct.affiliate_id)?;
        beneficiary.credit(direct.amount);
        beneficiary.check_balance_invariant()?;

        let mut records = vec![direct];
        let committed = if let Some(override_record) = override_leg {
            let mut master = self.storage.get_affiliate(&override_record.affiliate_id)?;
            master.credit(override_record.amount);
            master.check_balance_invariant()?;
            records.push(override_record);
            self.storage
                .credit_atomic(&records, &[&beneficiary, &master])
        } else {
            self.storage.credit_atomic(&records, &[&beneficiary])
        };
        committed?;

        drop(guards);

        for record in &records {
            self.metrics.record_earning(record);
            tracing::info!(
                affiliate = %record.affiliate_id,
                source = ?record.source_type,
                amount = %record.amount,
                "Earning recorded"
            );
        }

        Ok(records)
    }

    // Payout operations

    /// Get payout request by ID
    pub fn get_payout(&self, id: Uuid) -> Result<PayoutRequest> {
        self.storage.get_payout(id)
    }

    /// The affiliate's current non-terminal payout, if any
    pub fn active_payout(&self, affiliate_id: &AffiliateId) -> Result<Option<Uuid>> {
        self.storage.active_payout(affiliate_id)
    }

    /// Open a payout request, claiming the affiliate's single active
    /// slot. Rejects a second live request (no double-spend of the same
    /// pending earnings) and any amount exceeding pending earnings.
    pub async fn open_payout(&self, payout: PayoutRequest) -> Result<PayoutRequest> {
        if payout.amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "payout amount must be > 0, got {}",
                payout.amount
            )));
        }
        if payout.status != PayoutStatus::Pending {
            return Err(Error::Validation(
                "new payout requests must start pending".to_string(),
            ));
        }

        let _guard = self.guard(&payout.affiliate_id).await;

        if let Some(existing) = self.storage.active_payout(&payout.affiliate_id)? {
            return Err(Error::Conflict(format!(
                "affiliate {} already has payout {} in flight",
                payout.affiliate_id, existing
            )));
        }

        let affiliate = self.storage.get_affiliate(&payout.affiliate_id)?;
        if payout.amount > affiliate.pending_earnings {
            return Err(Error::InsufficientBalance {
                requested: payout.amount,
                available: affiliate.pending_earnings,
            });
        }

        self.storage.open_payout_atomic(&payout)?;
        self.metrics.record_payout_opened(&payout);
        tracing::info!(
            payout = %payout.id,
            affiliate = %payout.affiliate_id,
            amount = %payout.amount,
            "Payout requested"
        );
        Ok(payout)
    }

    /// Apply a non-balance payout transition with an optimistic
    /// pre-state check.
    ///
    /// Re-reads the request inside the affiliate's serialization scope;
    /// if another actor already moved it, rejects with `StaleState` and
    /// no side effect. The closure sets the new status and stamps; the
    /// resulting edge must be legal in the state graph.
    pub async fn transition_payout<F>(
        &self,
        id: Uuid,
        expected: PayoutStatus,
        f: F,
    ) -> Result<PayoutRequest>
    where
        F: FnOnce(&mut PayoutRequest) -> Result<()>,
    {
        let affiliate_id = self.storage.get_payout(id)?.affiliate_id;
        let _guard = self.guard(&affiliate_id).await;

        let mut payout = self.storage.get_payout(id)?;
        if payout.status != expected {
            return Err(Error::StaleState {
                expected,
                actual: payout.status,
            });
        }

        f(&mut payout)?;

        if payout.status != expected && !expected.can_transition_to(payout.status) {
            return Err(Error::Validation(format!(
                "illegal payout transition {} -> {}",
                expected, payout.status
            )));
        }

        self.storage.put_payout_atomic(&payout)?;
        tracing::info!(
            payout = %payout.id,
            from = %expected,
            to = %payout.status,
            "Payout transitioned"
        );
        Ok(payout)
    }

    /// Complete a processing payout: move `amount` from pending to paid
    /// on the affiliate and flip pending earnings to `Paid` oldest
    /// first, never marking more than `amount` in total. One atomic
    /// commit covers the request, the balance snapshot and every
    /// flipped record.
    pub async fn settle_payout(&self, id: Uuid, transaction_id: String) -> Result<PayoutRequest> {
        let affiliate_id = self.storage.get_payout(id)?.affiliate_id;
        let _guard = self.guard(&affiliate_id).await;

        let mut payout = self.storage.get_payout(id)?;
        if payout.status != PayoutStatus::Processing {
            return Err(Error::StaleState {
                expected: PayoutStatus::Processing,
                actual: payout.status,
            });
        }

        let mut affiliate = self.storage.get_affiliate(&payout.affiliate_id)?;
        affiliate.settle(payout.amount)?;
        affiliate.check_balance_invariant()?;

        // Deterministic mapping between ledger rows and the payout:
        // oldest pending rows first, stopping before the total would
        // exceed the disbursed amount. Rows are never split.
        let mut covered = Decimal::ZERO;
        let mut paid_records = Vec::new();
        for mut record in self.storage.pending_earnings_fifo(&payout.affiliate_id)? {
            if covered + record.amount > payout.amount {
                break;
            }
            covered += record.amount;
            record.status = EarningStatus::Paid;
            paid_records.push(record);
        }

        payout.status = PayoutStatus::Completed;
        payout.completed_at = Some(Utc::now());
        payout.transaction_id = Some(transaction_id);

        self.storage
            .settle_payout_atomic(&payout, &affiliate, &paid_records)?;

        self.metrics.record_payout_completed(&payout);
        tracing::info!(
            payout = %payout.id,
            affiliate = %payout.affiliate_id,
            amount = %payout.amount,
            rows_paid = paid_records.len(),
            "Payout completed"
        );
        Ok(payout)
    }

    // Hierarchy link operations (validated by the resolver)

    /// The sub-affiliate's link, if any
    pub fn get_link(&self, sub_id: &AffiliateId) -> Result<Option<MasterAffiliateLink>> {
        self.storage.get_link(sub_id)
    }

    /// The sub-affiliate's master, if any (pure point lookup)
    pub fn master_of(&self, sub_id: &AffiliateId) -> Result<Option<AffiliateId>> {
        Ok(self.storage.get_link(sub_id)?.map(|l| l.master_id))
    }

    /// Persist a validated link
    pub fn put_link(&self, link: &MasterAffiliateLink) -> Result<()> {
        self.storage.put_link_atomic(link)
    }

    /// Remove a link
    pub fn delete_link(&self, link: &MasterAffiliateLink) -> Result<()> {
        self.storage.delete_link_atomic(link)
    }

    /// Sub-affiliates of a master
    pub fn subs_of(&self, master_id: &AffiliateId) -> Result<Vec<AffiliateId>> {
        self.storage.subs_of(master_id)
    }

    /// Whether the affiliate is acting as a master
    pub fn has_subs(&self, id: &AffiliateId) -> Result<bool> {
        self.storage.has_subs(id)
    }
}
