//! End-to-end commission flow tests
//!
//! Exercises registration → activation → earning → cascade across the
//! engine, hierarchy resolver and ledger store together.

use affiliate_core::{
    Actor, ActorRole, Affiliate, AffiliateId, AffiliateStatus, CommissionConfig, CommissionType,
    Config, Currency, EarningSource, LedgerStore, PaymentMethod, PayoutConfig, PayoutSchedule,
};
use commission_engine::{ActivationWorkflow, CommissionEngine, CommissionEvent, LinkTerms};
use rust_decimal::Decimal;
use std::sync::Arc;

struct Harness {
    ledger: Arc<LedgerStore>,
    engine: CommissionEngine,
    activation: ActivationWorkflow,
    _temp: tempfile::TempDir,
}

fn harness() -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    let ledger = Arc::new(LedgerStore::open(&config).unwrap());
    Harness {
        engine: CommissionEngine::new(ledger.clone()),
        activation: ActivationWorkflow::new(ledger.clone()),
        ledger,
        _temp: temp,
    }
}

fn admin() -> Actor {
    Actor::new("admin-1", ActorRole::Admin)
}

async fn register(h: &Harness, code: &str) {
    h.ledger
        .create_affiliate(Affiliate::register(
            AffiliateId::new(code),
            code.to_string(),
            format!("{}@example.com", code.to_lowercase()),
            PayoutConfig {
                payment_method: PaymentMethod::BankTransfer,
                minimum_payout: Decimal::new(20000, 2), // 200.00
                payout_schedule: PayoutSchedule::Monthly,
                auto_payout: false,
            },
            Currency::USD,
        ))
        .await
        .unwrap();
}

async fn activate(h: &Harness, code: &str, bet_rate: Decimal) {
    h.activation
        .activate(
            &AffiliateId::new(code),
            Some(CommissionConfig {
                commission_type: CommissionType::RevenueShare,
                bet_rate,
                deposit_rate: Decimal::new(2, 2),
                cpa_flat_amount: Decimal::ZERO,
            }),
            &admin(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bet_event_credits_direct_commission() {
    // Affiliate with betRate=0.05, bet of 1000.00 → one record of 50.00
    let h = harness();
    register(&h, "AFF1").await;
    activate(&h, "AFF1", Decimal::new(5, 2)).await;

    let records = h
        .engine
        .record_earning(CommissionEvent {
            affiliate_id: AffiliateId::new("AFF1"),
            source_type: EarningSource::BetCommission,
            base_amount: Decimal::new(100000, 2),
            source_event_id: "bet-1001".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount, Decimal::new(5000, 2));

    let affiliate = h.ledger.get_affiliate(&AffiliateId::new("AFF1")).unwrap();
    assert_eq!(affiliate.pending_earnings, Decimal::new(5000, 2));
    assert_eq!(affiliate.total_earnings, Decimal::new(5000, 2));
    affiliate.check_balance_invariant().unwrap();
}

#[tokio::test]
async fn test_activation_gate_on_pending_affiliate() {
    // No commission config → rejected; valid hybrid config → active
    let h = harness();
    register(&h, "AFF2").await;

    let result = h
        .activation
        .activate(&AffiliateId::new("AFF2"), None, &admin())
        .await;
    assert!(result.is_err());
    assert_eq!(
        h.ledger
            .get_affiliate(&AffiliateId::new("AFF2"))
            .unwrap()
            .status,
        AffiliateStatus::Pending
    );

    let affiliate = h
        .activation
        .activate(
            &AffiliateId::new("AFF2"),
            Some(CommissionConfig {
                commission_type: CommissionType::Hybrid,
                bet_rate: Decimal::new(5, 2),
                deposit_rate: Decimal::new(2, 2),
                cpa_flat_amount: Decimal::ZERO,
            }),
            &admin(),
        )
        .await
        .unwrap();
    assert_eq!(affiliate.status, AffiliateStatus::Active);
}

#[tokio::test]
async fn test_override_cascades_to_master() {
    // Sub earns 100.00 direct; master at 0.10 override earns 10.00
    let h = harness();
    register(&h, "SUB").await;
    register(&h, "MASTER").await;
    activate(&h, "SUB", Decimal::new(10, 2)).await; // 0.10
    activate(&h, "MASTER", Decimal::new(5, 2)).await;

    h.engine
        .hierarchy()
        .link_sub_affiliate(
            &AffiliateId::new("MASTER"),
            &AffiliateId::new("SUB"),
            LinkTerms {
                override_commission_rate: Decimal::new(10, 2), // 0.10
                bet_rate: None,
                deposit_rate: None,
            },
        )
        .unwrap();

    let records = h
        .engine
        .record_earning(CommissionEvent {
            affiliate_id: AffiliateId::new("SUB"),
            source_type: EarningSource::BetCommission,
            base_amount: Decimal::new(100000, 2), // 1000.00 * 0.10 = 100.00
            source_event_id: "bet-2001".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].amount, Decimal::new(10000, 2)); // 100.00
    assert_eq!(records[1].amount, Decimal::new(1000, 2)); // 10.00
    assert_eq!(records[1].source_type, EarningSource::OverrideCommission);

    let sub = h.ledger.get_affiliate(&AffiliateId::new("SUB")).unwrap();
    let master = h.ledger.get_affiliate(&AffiliateId::new("MASTER")).unwrap();
    assert_eq!(sub.pending_earnings, Decimal::new(10000, 2));
    assert_eq!(master.pending_earnings, Decimal::new(1000, 2));
    sub.check_balance_invariant().unwrap();
    master.check_balance_invariant().unwrap();
}

#[tokio::test]
async fn test_replayed_event_credits_exactly_once() {
    let h = harness();
    register(&h, "SUB3").await;
    register(&h, "MST3").await;
    activate(&h, "SUB3", Decimal::new(5, 2)).await;
    activate(&h, "MST3", Decimal::new(5, 2)).await;

    h.engine
        .hierarchy()
        .link_sub_affiliate(
            &AffiliateId::new("MST3"),
            &AffiliateId::new("SUB3"),
            LinkTerms {
                override_commission_rate: Decimal::new(10, 2),
                bet_rate: None,
                deposit_rate: None,
            },
        )
        .unwrap();

    let event = CommissionEvent {
        affiliate_id: AffiliateId::new("SUB3"),
        source_type: EarningSource::DepositCommission,
        base_amount: Decimal::new(50000, 2), // 500.00 * 0.02 = 10.00
        source_event_id: "dep-313".to_string(),
    };

    let records = h.engine.record_earning(event.clone()).await.unwrap();
    assert_eq!(records.len(), 2);

    // Retried upstream delivery of the same event
    let replay = h.engine.record_earning(event).await;
    assert!(replay.unwrap_err().is_conflict());

    // Exactly one record pair and one balance increment
    let sub = h.ledger.get_affiliate(&AffiliateId::new("SUB3")).unwrap();
    let master = h.ledger.get_affiliate(&AffiliateId::new("MST3")).unwrap();
    assert_eq!(sub.pending_earnings, Decimal::new(1000, 2));
    assert_eq!(master.pending_earnings, Decimal::new(100, 2));
    assert_eq!(h.ledger.pending_earnings(&AffiliateId::new("SUB3")).unwrap().len(), 1);
    assert_eq!(h.ledger.pending_earnings(&AffiliateId::new("MST3")).unwrap().len(), 1);
}

#[tokio::test]
async fn test_cpa_registration_flat_amount() {
    let h = harness();
    register(&h, "CPA1").await;
    h.activation
        .activate(
            &AffiliateId::new("CPA1"),
            Some(CommissionConfig {
                commission_type: CommissionType::Cpa,
                bet_rate: Decimal::ZERO,
                deposit_rate: Decimal::ZERO,
                cpa_flat_amount: Decimal::new(2500, 2), // 25.00
            }),
            &admin(),
        )
        .await
        .unwrap();

    let records = h
        .engine
        .record_earning(CommissionEvent {
            affiliate_id: AffiliateId::new("CPA1"),
            source_type: EarningSource::Registration,
            base_amount: Decimal::ZERO, // ignored for flat
            source_event_id: "reg-77".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount, Decimal::new(2500, 2));

    // The same affiliate earns nothing on bet volume
    let result = h
        .engine
        .record_earning(CommissionEvent {
            affiliate_id: AffiliateId::new("CPA1"),
            source_type: EarningSource::BetCommission,
            base_amount: Decimal::new(100000, 2),
            source_event_id: "bet-78".to_string(),
        })
        .await;
    assert!(result.is_err());
}
