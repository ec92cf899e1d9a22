//! Core types for the affiliate commission engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money, never floats)
//! - Closed status sets (exhaustive matching, no stringly-typed states)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Affiliate identifier (unique program code)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffiliateId(String);

impl AffiliateId {
    /// Create new affiliate ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AffiliateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Affiliate account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AffiliateStatus {
    /// Awaiting activation (initial state at registration)
    Pending = 1,
    /// Earning commission
    Active = 2,
    /// Temporarily disabled by admin
    Suspended = 3,
    /// Banned (terminal except explicit reinstatement)
    Banned = 4,
    /// Soft-deleted / anonymized
    Inactive = 5,
}

/// KYC verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum VerificationStatus {
    /// No documents submitted
    Unverified = 1,
    /// Documents under review
    Pending = 2,
    /// Identity verified
    Verified = 3,
    /// Verification rejected
    Rejected = 4,
}

/// Commission model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommissionType {
    /// Percentage of referred betting / deposit volume
    RevenueShare = 1,
    /// Flat payment per qualifying registration
    Cpa = 2,
    /// Revenue share plus CPA
    Hybrid = 3,
}

/// Commission rate configuration
///
/// Rates are fractions in `0..=1`; `cpa_flat_amount` is a money
/// amount per qualifying registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Commission model
    pub commission_type: CommissionType,
    /// Share of bet volume (0..=1)
    pub bet_rate: Decimal,
    /// Share of deposit volume (0..=1)
    pub deposit_rate: Decimal,
    /// Flat amount per registration
    pub cpa_flat_amount: Decimal,
}

impl CommissionConfig {
    /// Validate rate bounds and model completeness.
    ///
    /// An affiliate must not be activatable with a configuration
    /// under which it could never earn: revenue share needs at least
    /// one positive rate, CPA needs a positive flat amount, hybrid
    /// needs at least one positive component.
    pub fn validate(&self) -> crate::Result<()> {
        let unit = Decimal::ONE;
        if self.bet_rate < Decimal::ZERO || self.bet_rate > unit {
            return Err(crate::Error::Validation(format!(
                "bet_rate {} outside 0..=1",
                self.bet_rate
            )));
        }
        if self.deposit_rate < Decimal::ZERO || self.deposit_rate > unit {
            return Err(crate::Error::Validation(format!(
                "deposit_rate {} outside 0..=1",
                self.deposit_rate
            )));
        }
        if self.cpa_flat_amount < Decimal::ZERO {
            return Err(crate::Error::Validation(
                "cpa_flat_amount must be >= 0".to_string(),
            ));
        }

        let has_share = self.bet_rate > Decimal::ZERO || self.deposit_rate > Decimal::ZERO;
        let has_flat = self.cpa_flat_amount > Decimal::ZERO;

        let complete = match self.commission_type {
            CommissionType::RevenueShare => has_share,
            CommissionType::Cpa => has_flat,
            CommissionType::Hybrid => has_share || has_flat,
        };

        if !complete {
            return Err(crate::Error::Validation(format!(
                "commission config of type {:?} has no earning component",
                self.commission_type
            )));
        }

        Ok(())
    }
}

/// Disbursement channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentMethod {
    /// SEPA / wire transfer
    BankTransfer = 1,
    /// E-wallet provider
    Ewallet = 2,
    /// Cryptocurrency address
    Crypto = 3,
}

/// Payout cadence for auto-payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayoutSchedule {
    /// Every week
    Weekly = 1,
    /// Twice a month
    Biweekly = 2,
    /// Once a month
    Monthly = 3,
    /// Manual requests only
    OnDemand = 4,
}

/// Payout configuration per affiliate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Disbursement channel
    pub payment_method: PaymentMethod,
    /// Smallest payout the affiliate may request (money > 0)
    pub minimum_payout: Decimal,
    /// Cadence for automatic payouts
    pub payout_schedule: PayoutSchedule,
    /// Whether the scheduler may request payouts on the affiliate's behalf
    pub auto_payout: bool,
}

impl PayoutConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.minimum_payout <= Decimal::ZERO {
            return Err(crate::Error::Validation(
                "minimum_payout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Affiliate account with running balance snapshot
///
/// Balance invariant: `total_earnings == pending_earnings + paid_earnings`
/// must hold after every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affiliate {
    /// Unique affiliate code
    pub id: AffiliateId,

    /// Display name
    pub display_name: String,

    /// Contact email
    pub contact_email: String,

    /// Account status
    pub status: AffiliateStatus,

    /// KYC verification status
    pub verification: VerificationStatus,

    /// Commission configuration (set at activation at the latest)
    pub commission: Option<CommissionConfig>,

    /// Payout configuration
    pub payout: PayoutConfig,

    /// Settlement currency
    pub currency: Currency,

    /// Lifetime earnings
    pub total_earnings: Decimal,

    /// Earned but not yet disbursed
    pub pending_earnings: Decimal,

    /// Disbursed
    pub paid_earnings: Decimal,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Affiliate {
    /// Create a new affiliate in `Pending` status with zero balances
    pub fn register(
        id: AffiliateId,
        display_name: impl Into<String>,
        contact_email: impl Into<String>,
        payout: PayoutConfig,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            contact_email: contact_email.into(),
            status: AffiliateStatus::Pending,
            verification: VerificationStatus::Unverified,
            commission: None,
            payout,
            currency,
            total_earnings: Decimal::ZERO,
            pending_earnings: Decimal::ZERO,
            paid_earnings: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credit a pending earning to the balance snapshot
    pub fn credit(&mut self, amount: Decimal) {
        self.total_earnings += amount;
        self.pending_earnings += amount;
        self.updated_at = Utc::now();
    }

    /// Move `amount` from pending to paid (payout completion)
    pub fn settle(&mut self, amount: Decimal) -> crate::Result<()> {
        if amount > self.pending_earnings {
            return Err(crate::Error::InsufficientBalance {
                requested: amount,
                available: self.pending_earnings,
            });
        }
        self.pending_earnings -= amount;
        self.paid_earnings += amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check the balance invariant
    pub fn check_balance_invariant(&self) -> crate::Result<()> {
        if self.total_earnings != self.pending_earnings + self.paid_earnings {
            return Err(crate::Error::InvariantViolation(format!(
                "affiliate {}: total {} != pending {} + paid {}",
                self.id, self.total_earnings, self.pending_earnings, self.paid_earnings
            )));
        }
        if self.pending_earnings < Decimal::ZERO || self.paid_earnings < Decimal::ZERO {
            return Err(crate::Error::InvariantViolation(format!(
                "affiliate {}: negative balance",
                self.id
            )));
        }
        Ok(())
    }
}

/// Source of an earning record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EarningSource {
    /// Share of referred bet volume
    BetCommission = 1,
    /// Share of referred deposit volume
    DepositCommission = 2,
    /// CPA payment for a qualifying registration
    Registration = 3,
    /// Master affiliate's share of a sub-affiliate's direct earning
    OverrideCommission = 4,
    /// Discretionary bonus
    Bonus = 5,
    /// Promotional incentive
    Incentive = 6,
    /// Manual correction or other credit
    Other = 7,
}

/// Ledger status of an earning record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EarningStatus {
    /// Earned, not yet disbursed
    Pending = 1,
    /// Covered by a completed payout
    Paid = 2,
    /// Voided by manual correction
    Cancelled = 3,
}

/// Immutable ledger entry for a single earning
///
/// Created only by the commission engine; `status` is later flipped
/// to `Paid` only by the payout state machine. `amount` is never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningRecord {
    /// Unique record ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Beneficiary affiliate
    pub affiliate_id: AffiliateId,

    /// What generated this earning
    pub source_type: EarningSource,

    /// Earning amount (money > 0)
    pub amount: Decimal,

    /// Ledger status
    pub status: EarningStatus,

    /// When the earning accrued
    pub earned_at: DateTime<Utc>,

    /// For override rows: the sub-affiliate whose activity generated it
    pub source_affiliate_id: Option<AffiliateId>,

    /// Idempotency key of the triggering upstream event
    pub source_event_id: Option<String>,
}

impl EarningRecord {
    /// Create a pending earning record
    pub fn new(
        affiliate_id: AffiliateId,
        source_type: EarningSource,
        amount: Decimal,
        source_affiliate_id: Option<AffiliateId>,
        source_event_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            affiliate_id,
            source_type,
            amount,
            status: EarningStatus::Pending,
            earned_at: Utc::now(),
            source_affiliate_id,
            source_event_id,
        }
    }
}

/// Payout request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayoutStatus {
    /// Awaiting admin processing
    Pending = 1,
    /// Disbursement in flight
    Processing = 2,
    /// Disbursed; balances moved (terminal)
    Completed = 3,
    /// Disbursement failed; retryable until attempts exhaust
    Failed = 4,
    /// Rejected before disbursement (terminal)
    Cancelled = 5,
    /// Manually paused mid-processing
    OnHold = 6,
}

impl PayoutStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Cancelled)
    }

    /// Check whether a transition to `next` is legal.
    ///
    /// Exhaustive over the state graph; anything not listed is
    /// rejected with no side effect. Note that cancellation is never
    /// reachable from `Processing`: an external payment may be in
    /// flight, so the request must first reach `Completed` or
    /// `Failed`. A `Failed` request can be cancelled, which is the
    /// manual escape once its retry budget is spent; no attempt moved
    /// funds, so abandoning it is safe.
    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Pending, Failed) => true,
            (Pending, Cancelled) => true,
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            (Processing, OnHold) => true,
            (OnHold, Processing) => true,
            (OnHold, Cancelled) => true,
            // Retry path; gated on retry_attempt < max_retries by the engine
            (Failed, Pending) => true,
            (Failed, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
            PayoutStatus::OnHold => "on_hold",
        };
        write!(f, "{}", s)
    }
}

/// Payout request workflow object
///
/// Append-mostly for audit: created once, driven through the state
/// machine, retained indefinitely. `notes` accumulate rather than
/// overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Unique request ID
    pub id: Uuid,

    /// Requesting affiliate
    pub affiliate_id: AffiliateId,

    /// Amount to disburse (money > 0)
    pub amount: Decimal,

    /// Disbursement currency
    pub currency: Currency,

    /// Current state
    pub status: PayoutStatus,

    /// Creation timestamp
    pub requested_at: DateTime<Utc>,

    /// When processing began
    pub processed_at: Option<DateTime<Utc>>,

    /// When the request reached `Completed`
    pub completed_at: Option<DateTime<Utc>>,

    /// External gateway transaction reference
    pub transaction_id: Option<String>,

    /// Last failure reason
    pub failure_reason: Option<String>,

    /// Retries performed so far
    pub retry_attempt: u32,

    /// Retry budget before the failure becomes terminal
    pub max_retries: u32,

    /// Free-text audit trail from admins/affiliates
    pub notes: Vec<String>,
}

impl PayoutRequest {
    /// Create a new pending payout request
    pub fn new(
        affiliate_id: AffiliateId,
        amount: Decimal,
        currency: Currency,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            affiliate_id,
            amount,
            currency,
            status: PayoutStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            transaction_id: None,
            failure_reason: None,
            retry_attempt: 0,
            max_retries,
            notes: Vec::new(),
        }
    }

    /// Check if the request is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Master → sub relationship with override terms
///
/// Directed, acyclic, depth capped at 1. The optional custom rates
/// take precedence over the sub-affiliate's own base rates for the
/// override-share computation only, never for the sub's own direct
/// earnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterAffiliateLink {
    /// Master affiliate (override beneficiary)
    pub master_id: AffiliateId,

    /// Sub-affiliate
    pub sub_id: AffiliateId,

    /// Share of the sub's direct earning paid to the master (0..=1)
    pub override_commission_rate: Decimal,

    /// Custom bet rate for override-basis computation
    pub bet_rate: Option<Decimal>,

    /// Custom deposit rate for override-basis computation
    pub deposit_rate: Option<Decimal>,

    /// Link timestamp
    pub linked_at: DateTime<Utc>,
}

impl MasterAffiliateLink {
    /// Validate rate bounds
    pub fn validate(&self) -> crate::Result<()> {
        for (name, rate) in [
            ("override_commission_rate", Some(self.override_commission_rate)),
            ("bet_rate", self.bet_rate),
            ("deposit_rate", self.deposit_rate),
        ] {
            if let Some(r) = rate {
                if r < Decimal::ZERO || r > Decimal::ONE {
                    return Err(crate::Error::Validation(format!(
                        "{} {} outside 0..=1",
                        name, r
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Role of the actor invoking an operation
///
/// Identity is always an explicit input: the core never reads
/// ambient session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActorRole {
    /// The affiliate themself
    Affiliate = 1,
    /// Back-office admin
    Admin = 2,
    /// Elevated admin (reinstatement, manual corrections)
    SuperAdmin = 3,
}

/// Authenticated actor passed into every mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque identity from the authentication layer
    pub id: String,
    /// Authorization role
    pub role: ActorRole,
}

impl Actor {
    /// Construct an actor
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }
}
