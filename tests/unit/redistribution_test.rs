// Unit tests for the surplus/shortfall redistribution engine

use chrono::{Days, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use qistflow::config::EngineConfig;
use qistflow::modules::plans::models::{
    CustomerSnapshot, InstallmentPlan, InstallmentStatus, InstallmentUnit, PaymentMethod,
    PlanTerms, ProductSnapshot,
};
use qistflow::modules::plans::services::{
    DistributionSummary, Redistributor, ScheduleBuilder, TriggerPayment,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn now() -> NaiveDateTime {
    date(2025, 12, 1).and_hms_opt(10, 0, 0).unwrap()
}

fn plan_of(count: u32, amount: Decimal) -> InstallmentPlan {
    let terms = PlanTerms {
        total_amount: amount * Decimal::from(count),
        advance_amount: dec!(0),
        installment_count: count,
        unit: InstallmentUnit::Months,
        installment_amount: amount,
        start_date: date(2025, 11, 1),
        due_day: 5,
    };
    let installments = ScheduleBuilder::build(&terms).unwrap();

    InstallmentPlan::new(
        "cust-1".to_string(),
        CustomerSnapshot {
            name: "Asad".to_string(),
            email: "asad@example.com".to_string(),
            phone: "0300".to_string(),
            address: None,
            reference: None,
        },
        ProductSnapshot {
            name: "Fridge".to_string(),
            description: None,
        },
        terms,
        None,
        "user-1".to_string(),
        installments,
        now(),
    )
    .unwrap()
}

fn trigger(number: i32) -> TriggerPayment {
    TriggerPayment {
        installment_number: number,
        method: PaymentMethod::Cash,
        paid_by: "user-1".to_string(),
        notes: None,
        now: now(),
    }
}

/// Pay installment `number` with the given actual amount and run redistribution
fn pay(
    plan: &mut InstallmentPlan,
    number: i32,
    actual: Decimal,
    engine: EngineConfig,
) -> DistributionSummary {
    let scheduled = plan.installment(number).unwrap().amount;
    plan.installment_mut(number)
        .unwrap()
        .mark_paid(actual, PaymentMethod::Cash, None, "user-1", now())
        .unwrap();

    Redistributor::new(engine)
        .apply(plan, &trigger(number), actual - scheduled)
        .unwrap()
}

fn amounts(plan: &InstallmentPlan) -> Vec<Decimal> {
    plan.installments.iter().map(|i| i.amount).collect()
}

#[test]
fn test_exact_payment_changes_nothing() {
    let mut plan = plan_of(3, dec!(1000));
    let summary = pay(&mut plan, 1, dec!(1000), EngineConfig::default());

    assert_eq!(summary, DistributionSummary::Unchanged);
    assert_eq!(amounts(&plan), vec![dec!(1000), dec!(1000), dec!(1000)]);
}

#[test]
fn test_full_payoff_cascade() {
    // 4 items of 1000; paying #1 with 4000 leaves surplus 3000 = exactly the
    // remaining total, so #2-#4 are cleared at zero with no new item appended
    let mut plan = plan_of(4, dec!(1000));
    let summary = pay(&mut plan, 1, dec!(4000), EngineConfig::default());

    assert_eq!(plan.installments.len(), 4);
    for number in 2..=4 {
        let item = plan.installment(number).unwrap();
        assert_eq!(item.status, InstallmentStatus::Paid);
        assert_eq!(item.amount, Decimal::ZERO);
        assert_eq!(item.actual_paid_amount, Some(Decimal::ZERO));
        assert_eq!(item.paid_by.as_deref(), Some("user-1"));
        assert!(item
            .notes
            .as_deref()
            .unwrap()
            .contains("surplus from installment #1"));
    }

    match summary {
        DistributionSummary::AllRemainingCleared {
            cleared_count,
            cleared_total,
            leftover,
            appended,
        } => {
            assert_eq!(cleared_count, 3);
            assert_eq!(cleared_total, dec!(3000));
            assert_eq!(leftover, Decimal::ZERO);
            assert!(appended.is_none());
        }
        other => panic!("unexpected summary: {:?}", other),
    }
}

#[test]
fn test_cascade_keeps_caller_notes() {
    let mut plan = plan_of(3, dec!(1000));
    plan.installment_mut(1)
        .unwrap()
        .mark_paid(
            dec!(3000),
            PaymentMethod::Cash,
            Some("cleared in full".to_string()),
            "user-1",
            now(),
        )
        .unwrap();

    let mut t = trigger(1);
    t.notes = Some("cleared in full".to_string());
    Redistributor::new(EngineConfig::default())
        .apply(&mut plan, &t, dec!(2000))
        .unwrap();

    assert_eq!(
        plan.installment(2).unwrap().notes.as_deref(),
        Some("cleared in full")
    );
}

#[test]
fn test_partial_surplus_split() {
    // Surplus 150 over 3 remaining: ceil(150/3) = 50 off each
    let mut plan = plan_of(4, dec!(1000));
    let summary = pay(&mut plan, 1, dec!(1150), EngineConfig::default());

    assert_eq!(
        amounts(&plan),
        vec![dec!(1000), dec!(950), dec!(950), dec!(950)]
    );
    assert_eq!(
        summary,
        DistributionSummary::SurplusSpread {
            difference: dec!(150),
            per_item: dec!(50),
            affected: 3,
        }
    );
}

#[test]
fn test_shortfall_split() {
    // Paying 850 against 1000: ceil(150/3) = 50 onto each remaining
    let mut plan = plan_of(4, dec!(1000));
    let summary = pay(&mut plan, 1, dec!(850), EngineConfig::default());

    assert_eq!(
        amounts(&plan),
        vec![dec!(1000), dec!(1050), dec!(1050), dec!(1050)]
    );
    assert_eq!(
        summary,
        DistributionSummary::ShortfallSpread {
            difference: dec!(-150),
            per_item: dec!(50),
            affected: 3,
        }
    );
}

#[test]
fn test_surplus_floors_at_zero() {
    // Per-item reduction larger than a remaining amount must not go negative
    let mut plan = plan_of(3, dec!(100));
    pay(&mut plan, 1, dec!(350), EngineConfig::default());

    // Surplus 250 over 2 remaining: ceil = 125 each, floored at 0
    assert_eq!(plan.installment(2).unwrap().amount, Decimal::ZERO);
    assert_eq!(plan.installment(3).unwrap().amount, Decimal::ZERO);
}

#[test]
fn test_ceiling_division_never_undercollects() {
    // Surplus 100 over 3 remaining: ceil(100/3) = 34, total distributed 102
    let mut plan = plan_of(4, dec!(1000));
    pay(&mut plan, 1, dec!(1100), EngineConfig::default());

    assert_eq!(
        amounts(&plan),
        vec![dec!(1000), dec!(966), dec!(966), dec!(966)]
    );
}

#[test]
fn test_no_remaining_appends_new_item() {
    // Single-item plan paid with 500 extra: new pending item #2 for 500,
    // due 30 days after the old due date
    let mut plan = plan_of(1, dec!(1000));
    let old_due = plan.installment(1).unwrap().due_date;
    let summary = pay(&mut plan, 1, dec!(1500), EngineConfig::default());

    assert_eq!(plan.installments.len(), 2);
    let appended = plan.installment(2).unwrap();
    assert_eq!(appended.amount, dec!(500));
    assert_eq!(appended.status, InstallmentStatus::Pending);
    assert_eq!(appended.due_date, old_due.checked_add_days(Days::new(30)).unwrap());
    assert_eq!(
        summary,
        DistributionSummary::Appended {
            installment_number: 2,
            amount: dec!(500),
        }
    );
}

#[test]
fn test_no_remaining_shortfall_appends_abs() {
    let mut plan = plan_of(1, dec!(1000));
    pay(&mut plan, 1, dec!(400), EngineConfig::default());

    assert_eq!(plan.installments.len(), 2);
    assert_eq!(plan.installment(2).unwrap().amount, dec!(600));
    assert_eq!(
        plan.installment(2).unwrap().status,
        InstallmentStatus::Pending
    );
}

#[test]
fn test_leftover_surplus_dropped_by_default() {
    // Surplus 2500 against remaining 2000: leftover 500 is a wash but reported
    let mut plan = plan_of(3, dec!(1000));
    let summary = pay(&mut plan, 1, dec!(3500), EngineConfig::default());

    assert_eq!(plan.installments.len(), 3);
    match summary {
        DistributionSummary::AllRemainingCleared {
            leftover, appended, ..
        } => {
            assert_eq!(leftover, dec!(500));
            assert!(appended.is_none());
        }
        other => panic!("unexpected summary: {:?}", other),
    }
    assert!(summary.message().unwrap().contains("not carried"));
}

#[test]
fn test_leftover_surplus_carried_when_configured() {
    let engine = EngineConfig {
        carry_leftover_surplus: true,
    };
    let mut plan = plan_of(3, dec!(1000));
    let summary = pay(&mut plan, 1, dec!(3500), engine);

    assert_eq!(plan.installments.len(), 4);
    let appended = plan.installment(4).unwrap();
    assert_eq!(appended.amount, dec!(500));
    assert_eq!(appended.status, InstallmentStatus::Pending);

    match summary {
        DistributionSummary::AllRemainingCleared {
            leftover, appended, ..
        } => {
            assert_eq!(leftover, dec!(500));
            assert_eq!(appended, Some((4, dec!(500))));
        }
        other => panic!("unexpected summary: {:?}", other),
    }
}

#[test]
fn test_shortfall_reopens_surplus_covered_items() {
    // #2 paid with surplus that clears #3 and #4 at zero; #1 then underpaid.
    // The zero-amount paid items come back as pending carrying the debt.
    let mut plan = plan_of(4, dec!(1000));
    pay(&mut plan, 2, dec!(3000), EngineConfig::default());
    assert!(plan.installment(3).unwrap().is_zero_amount_paid());
    assert!(plan.installment(4).unwrap().is_zero_amount_paid());

    let summary = pay(&mut plan, 1, dec!(850), EngineConfig::default());

    // Shortfall 150 over two reopen candidates: ceil(150/2) = 75 each
    match summary {
        DistributionSummary::ShortfallSpread {
            per_item, affected, ..
        } => {
            assert_eq!(per_item, dec!(75));
            assert_eq!(affected, 2);
        }
        other => panic!("unexpected summary: {:?}", other),
    }
    for number in 3..=4 {
        let item = plan.installment(number).unwrap();
        assert_eq!(item.status, InstallmentStatus::Pending);
        assert_eq!(item.amount, dec!(75));
        assert_eq!(item.actual_paid_amount, None);
        assert!(item.paid_date.is_none());
    }
}

#[test]
fn test_surplus_reopens_mixed_with_open_items() {
    // #3 paid with surplus clearing #4 and #5; then #1 overpaid by 100.
    // Remaining = open #2 plus zero-paid #4 and #5; the zero-paid items are
    // reopened carrying the per-item share instead of a reduction.
    let mut plan = plan_of(5, dec!(1000));
    pay(&mut plan, 3, dec!(3000), EngineConfig::default());

    let summary = pay(&mut plan, 1, dec!(1100), EngineConfig::default());

    match summary {
        DistributionSummary::SurplusSpread {
            per_item, affected, ..
        } => {
            assert_eq!(per_item, dec!(34));
            assert_eq!(affected, 3);
        }
        other => panic!("unexpected summary: {:?}", other),
    }
    assert_eq!(plan.installment(2).unwrap().amount, dec!(966));
    assert_eq!(plan.installment(4).unwrap().status, InstallmentStatus::Pending);
    assert_eq!(plan.installment(4).unwrap().amount, dec!(34));
    assert_eq!(plan.installment(5).unwrap().amount, dec!(34));
}

#[test]
fn test_nudge_reduces_later_open_items() {
    let mut plan = plan_of(4, dec!(1000));
    pay(&mut plan, 1, dec!(1000), EngineConfig::default());

    // Correction raises the recorded payment by 300: ceil(300/3) = 100 off each
    let summary = Redistributor::nudge(&mut plan, 1, dec!(300));
    assert_eq!(
        amounts(&plan),
        vec![dec!(1000), dec!(900), dec!(900), dec!(900)]
    );
    assert_eq!(
        summary,
        DistributionSummary::SurplusSpread {
            difference: dec!(300),
            per_item: dec!(100),
            affected: 3,
        }
    );
}

#[test]
fn test_nudge_never_reopens_paid_items() {
    let mut plan = plan_of(4, dec!(1000));
    pay(&mut plan, 1, dec!(4000), EngineConfig::default());

    // All later items are zero-amount paid; a correction must not touch them
    let summary = Redistributor::nudge(&mut plan, 1, dec!(-500));
    assert_eq!(summary, DistributionSummary::Unchanged);
    for number in 2..=4 {
        assert!(plan.installment(number).unwrap().is_paid());
    }
}

/// Outstanding + collected, measured against the plan total
fn reconciliation_drift(plan: &InstallmentPlan) -> Decimal {
    let collected: Decimal = plan
        .installments
        .iter()
        .filter(|i| i.is_paid())
        .filter_map(|i| i.actual_paid_amount)
        .sum();
    let outstanding: Decimal = plan
        .installments
        .iter()
        .filter(|i| !i.is_paid())
        .map(|i| i.amount)
        .sum();

    plan.terms.advance_amount + collected + outstanding - plan.terms.total_amount
}

proptest! {
    /// Reconciliation invariant: after one payment with an arbitrary custom
    /// amount, the drift introduced by ceiling division is bounded by
    /// remaining-count - 1 currency units.
    #[test]
    fn prop_reconciliation_drift_bounded(
        count in 2u32..8u32,
        actual in 1u32..2000u32,
    ) {
        let mut plan = plan_of(count, dec!(1000));
        pay(&mut plan, 1, Decimal::from(actual), EngineConfig::default());

        let slack = Decimal::from(count - 1);
        let drift = reconciliation_drift(&plan);
        prop_assert!(
            drift.abs() <= slack,
            "drift {} exceeds slack {}",
            drift,
            slack
        );
    }

    /// Numbering invariant: installment numbers stay unique and strictly
    /// increasing through payments and appends.
    #[test]
    fn prop_numbering_preserved(
        count in 1u32..6u32,
        actual in 1u32..5000u32,
    ) {
        let mut plan = plan_of(count, dec!(1000));
        pay(&mut plan, 1, Decimal::from(actual), EngineConfig::default());

        prop_assert!(plan.check_numbering().is_ok());
    }

    /// Ceiling division guarantee: a shortfall is always fully recovered
    /// (the remaining amounts grow by at least the shortfall).
    #[test]
    fn prop_shortfall_fully_recovered(
        count in 2u32..8u32,
        short in 1u32..999u32,
    ) {
        let mut plan = plan_of(count, dec!(1000));
        let before: Decimal = plan.installments[1..].iter().map(|i| i.amount).sum();
        pay(&mut plan, 1, dec!(1000) - Decimal::from(short), EngineConfig::default());
        let after: Decimal = plan.installments[1..].iter().map(|i| i.amount).sum();

        prop_assert!(after - before >= Decimal::from(short));
    }
}
