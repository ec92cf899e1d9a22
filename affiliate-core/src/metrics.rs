//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `affiliate_earnings_total` - Earning records committed
//! - `affiliate_override_earnings_total` - Override legs committed
//! - `affiliate_earning_amount` - Histogram of earning amounts
//! - `affiliate_payouts_opened_total` - Payout requests opened
//! - `affiliate_payouts_completed_total` - Payouts completed
//! - `affiliate_payout_amount` - Histogram of payout amounts

use crate::types::{EarningRecord, EarningSource, PayoutRequest};
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Earning records committed
    pub earnings_total: IntCounter,

    /// Override legs committed
    pub override_earnings_total: IntCounter,

    /// Earning amount histogram
    pub earning_amount: Histogram,

    /// Payout requests opened
    pub payouts_opened_total: IntCounter,

    /// Payouts completed
    pub payouts_completed_total: IntCounter,

    /// Payout amount histogram
    pub payout_amount: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let earnings_total = IntCounter::with_opts(Opts::new(
            "affiliate_earnings_total",
            "Earning records committed",
        ))?;
        registry.register(Box::new(earnings_total.clone()))?;

        let override_earnings_total = IntCounter::with_opts(Opts::new(
            "affiliate_override_earnings_total",
            "Override commission legs committed",
        ))?;
        registry.register(Box::new(override_earnings_total.clone()))?;

        let earning_amount = Histogram::with_opts(
            HistogramOpts::new("affiliate_earning_amount", "Earning amounts")
                .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]),
        )?;
        registry.register(Box::new(earning_amount.clone()))?;

        let payouts_opened_total = IntCounter::with_opts(Opts::new(
            "affiliate_payouts_opened_total",
            "Payout requests opened",
        ))?;
        registry.register(Box::new(payouts_opened_total.clone()))?;

        let payouts_completed_total = IntCounter::with_opts(Opts::new(
            "affiliate_payouts_completed_total",
            "Payouts completed",
        ))?;
        registry.register(Box::new(payouts_completed_total.clone()))?;

        let payout_amount = Histogram::with_opts(
            HistogramOpts::new("affiliate_payout_amount", "Payout amounts")
                .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 10000.0]),
        )?;
        registry.register(Box::new(payout_amount.clone()))?;

        Ok(Self {
            earnings_total,
            override_earnings_total,
            earning_amount,
            payouts_opened_total,
            payouts_completed_total,
            payout_amount,
            registry,
        })
    }

    /// Record a committed earning
    pub fn record_earning(&self, record: &EarningRecord) {
        self.earnings_total.inc();
        if record.source_type == EarningSource::OverrideCommission {
            self.override_earnings_total.inc();
        }
        self.earning_amount
            .observe(record.amount.to_f64().unwrap_or(0.0));
    }

    /// Record an opened payout request
    pub fn record_payout_opened(&self, payout: &PayoutRequest) {
        self.payouts_opened_total.inc();
        self.payout_amount
            .observe(payout.amount.to_f64().unwrap_or(0.0));
    }

    /// Record a completed payout
    pub fn record_payout_completed(&self, _payout: &PayoutRequest) {
        self.payouts_completed_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AffiliateId;
    use rust_decimal::Decimal;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.earnings_total.get(), 0);
        assert_eq!(metrics.payouts_opened_total.get(), 0);
    }

    #[test]
    fn test_record_earning_counts_overrides() {
        let metrics = Metrics::new().unwrap();

        let direct = EarningRecord::new(
            AffiliateId::new("A"),
            EarningSource::BetCommission,
            Decimal::new(10000, 2),
            None,
            None,
        );
        let override_leg = EarningRecord::new(
            AffiliateId::new("M"),
            EarningSource::OverrideCommission,
            Decimal::new(1000, 2),
            Some(AffiliateId::new("A")),
            None,
        );

        metrics.record_earning(&direct);
        metrics.record_earning(&override_leg);

        assert_eq!(metrics.earnings_total.get(), 2);
        assert_eq!(metrics.override_earnings_total.get(), 1);
    }
}
