//! Automatic payout scheduler
//!
//! Sweeps the affiliate population at configured UTC window times and
//! opens payouts for every affiliate who opted into auto-payout, has
//! pending earnings at or above their minimum, and has no request in
//! flight. A sweep is a best-effort batch: one affiliate failing does
//! not stop the others.

use crate::disbursement::Disbursement;
use crate::engine::PayoutEngine;
use crate::{Error, Result};
use affiliate_core::{Actor, AffiliateStatus, LedgerStore};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payout window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Times of day (UTC, "%H:%M") when payout sweeps run
    pub window_times: Vec<String>,

    /// Enable automatic sweeps
    pub auto_payout: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            window_times: vec!["06:00".to_string(), "18:00".to_string()],
            auto_payout: true,
        }
    }
}

impl ScheduleConfig {
    fn parse_times(&self) -> Result<Vec<NaiveTime>> {
        self.window_times
            .iter()
            .map(|time_str| {
                NaiveTime::parse_from_str(time_str, "%H:%M").map_err(|e| {
                    Error::Schedule(format!("invalid window time '{}': {}", time_str, e))
                })
            })
            .collect()
    }

    /// The next sweep time strictly after `now`
    pub fn next_window_time(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut times = self.parse_times()?;
        if times.is_empty() {
            return Err(Error::Schedule("no window times configured".to_string()));
        }
        times.sort();

        for window_time in &times {
            if now.time() < *window_time {
                return Ok(now.date_naive().and_time(*window_time).and_utc());
            }
        }
        // All of today's windows have passed; first window tomorrow
        let tomorrow = now.date_naive() + Duration::days(1);
        Ok(tomorrow.and_time(times[0]).and_utc())
    }
}

/// Summary of one sweep
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    /// Affiliates considered
    pub scanned: usize,
    /// Payouts opened and settled
    pub completed: usize,
    /// Payouts opened but failed at the gateway
    pub failed: usize,
    /// Affiliates skipped (ineligible, below minimum, or busy)
    pub skipped: usize,
}

/// Auto-payout sweep over the affiliate population
pub struct AutoPayoutScheduler {
    ledger: Arc<LedgerStore>,
    engine: Arc<PayoutEngine>,
    config: ScheduleConfig,
}

impl AutoPayoutScheduler {
    /// Create a scheduler over the ledger and payout engine
    pub fn new(ledger: Arc<LedgerStore>, engine: Arc<PayoutEngine>, config: ScheduleConfig) -> Self {
        Self {
            ledger,
            engine,
            config,
        }
    }

    /// The next sweep time strictly after `now`
    pub fn next_window_time(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.config.next_window_time(now)
    }

    /// Run one sweep: open and drive a payout for every eligible
    /// affiliate, full pending balance per payout.
    pub async fn run_sweep(&self, gateway: &dyn Disbursement, actor: &Actor) -> Result<SweepReport> {
        if !self.config.auto_payout {
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport::default();
        for affiliate in self.ledger.list_affiliates()? {
            report.scanned += 1;

            let eligible = affiliate.status == AffiliateStatus::Active
                && affiliate.payout.auto_payout
                && affiliate.pending_earnings >= affiliate.payout.minimum_payout
                && self.ledger.active_payout(&affiliate.id)?.is_none();
            if !eligible {
                report.skipped += 1;
                continue;
            }

            let payout = match self
                .engine
                .request(&affiliate.id, affiliate.pending_earnings, affiliate.currency, actor)
                .await
            {
                Ok(payout) => payout,
                Err(err) => {
                    // Lost a race with a manual request; skip, not abort
                    tracing::debug!(affiliate = %affiliate.id, error = %err, "Sweep skipped affiliate");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.engine.disburse_and_settle(payout.id, gateway, actor).await {
                Ok(settled) if settled.is_terminal() => report.completed += 1,
                Ok(_) => report.failed += 1,
                Err(err) => {
                    tracing::warn!(payout = %payout.id, error = %err, "Sweep payout errored");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "Auto-payout sweep finished"
        );
        Ok(report)
    }
}
