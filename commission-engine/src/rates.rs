//! Commission rate resolution
//!
//! Which rate applies depends on both the event source and the
//! affiliate's commission model:
//!
//! | source       | revenue_share | cpa        | hybrid     |
//! |--------------|---------------|------------|------------|
//! | bet          | bet_rate      | -           | bet_rate   |
//! | deposit      | deposit_rate  | -           | deposit_rate |
//! | registration | -              | flat       | flat       |
//!
//! Bonus / incentive / other events are manual credits and pass the
//! base amount through unchanged. A resolution of zero is rejected:
//! earning rows must carry a positive amount, so "this affiliate does
//! not earn on this event" surfaces as a typed error, not a zero row.

use affiliate_core::{CommissionConfig, CommissionType, EarningSource};
use rust_decimal::Decimal;

/// How a rate resolved for an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateResolution {
    /// Percentage of the base amount
    Share(Decimal),
    /// Flat amount regardless of the base
    Flat(Decimal),
    /// The base amount itself (manual credits)
    Passthrough,
}

/// Resolve the applicable rate, if any
pub fn rate_for(config: &CommissionConfig, source: EarningSource) -> Option<RateResolution> {
    match source {
        EarningSource::BetCommission => match config.commission_type {
            CommissionType::RevenueShare | CommissionType::Hybrid => {
                Some(RateResolution::Share(config.bet_rate))
            }
            CommissionType::Cpa => None,
        },
        EarningSource::DepositCommission => match config.commission_type {
            CommissionType::RevenueShare | CommissionType::Hybrid => {
                Some(RateResolution::Share(config.deposit_rate))
            }
            CommissionType::Cpa => None,
        },
        EarningSource::Registration => match config.commission_type {
            CommissionType::Cpa | CommissionType::Hybrid => {
                Some(RateResolution::Flat(config.cpa_flat_amount))
            }
            CommissionType::RevenueShare => None,
        },
        EarningSource::Bonus | EarningSource::Incentive | EarningSource::Other => {
            Some(RateResolution::Passthrough)
        }
        // Engine-generated only, never resolved from an inbound event
        EarningSource::OverrideCommission => None,
    }
}

/// Compute the direct commission amount for an event
pub fn direct_amount(
    config: &CommissionConfig,
    source: EarningSource,
    base_amount: Decimal,
) -> crate::Result<Decimal> {
    let resolution = rate_for(config, source).ok_or_else(|| {
        crate::Error::Rate(format!(
            "{:?} events do not earn under commission type {:?}",
            source, config.commission_type
        ))
    })?;

    let amount = match resolution {
        RateResolution::Share(rate) => base_amount * rate,
        RateResolution::Flat(flat) => flat,
        RateResolution::Passthrough => base_amount,
    };

    if amount <= Decimal::ZERO {
        return Err(crate::Error::Rate(format!(
            "{:?} resolves to a zero amount for this affiliate",
            source
        )));
    }

    Ok(amount)
}
