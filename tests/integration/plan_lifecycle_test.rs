// Plan lifecycle: creation, reads with derived status, edits, listing, deletion

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use qistflow::config::EngineConfig;
use qistflow::core::{AppError, FixedClock};
use qistflow::middleware::Caller;
use qistflow::modules::plans::models::{
    CustomerSnapshot, InstallmentStatus, InstallmentUnit, PaymentMethod, PlanTerms,
    ProductSnapshot,
};
use qistflow::modules::plans::repositories::{MemoryPlanStore, PlanFilter};
use qistflow::modules::plans::services::{
    summarize, CreatePlanInput, PaymentInput, PlanService,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn caller(user_id: &str) -> Caller {
    Caller {
        user_id: user_id.to_string(),
        can_write: true,
    }
}

fn terms(count: u32, amount: Decimal, start: NaiveDate, due_day: u32) -> PlanTerms {
    PlanTerms {
        total_amount: amount * Decimal::from(count),
        advance_amount: dec!(0),
        installment_count: count,
        unit: InstallmentUnit::Months,
        installment_amount: amount,
        start_date: start,
        due_day,
    }
}

fn create_input(customer_id: &str, terms: PlanTerms, manager_id: Option<&str>) -> CreatePlanInput {
    CreatePlanInput {
        customer_id: customer_id.to_string(),
        customer: CustomerSnapshot {
            name: "Sana".to_string(),
            email: "sana@example.com".to_string(),
            phone: "0303".to_string(),
            address: None,
            reference: Some("walk-in".to_string()),
        },
        product: ProductSnapshot {
            name: "Air conditioner".to_string(),
            description: Some("1.5 ton inverter".to_string()),
        },
        terms,
        manager_id: manager_id.map(str::to_string),
    }
}

fn exact_payment() -> PaymentInput {
    PaymentInput {
        method: PaymentMethod::BankTransfer,
        notes: None,
        custom_amount: None,
        due_date: None,
    }
}

fn service_at(y: i32, m: u32, d: u32) -> PlanService {
    PlanService::new(
        Arc::new(MemoryPlanStore::new()),
        Arc::new(FixedClock::at_date(y, m, d)),
        EngineConfig::default(),
    )
}

#[tokio::test]
async fn test_create_generates_full_schedule() {
    let service = service_at(2025, 11, 2);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    assert_eq!(plan.created_by, "user-1");
    assert_eq!(plan.version, 0);
    assert_eq!(plan.installments.len(), 3);

    let numbers: Vec<i32> = plan
        .installments
        .iter()
        .map(|i| i.installment_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(plan.installments[0].due_date, date(2025, 12, 5));
    assert_eq!(plan.installments[2].due_date, date(2026, 2, 5));

    // Round-trips through the store
    let reloaded = service.get_plan(&plan.id).await.unwrap();
    assert_eq!(reloaded.customer.name, "Sana");
    assert_eq!(reloaded.product.name, "Air conditioner");
    assert_eq!(reloaded.terms.installment_amount, dec!(1000));
}

#[tokio::test]
async fn test_reads_derive_overdue_from_clock() {
    // First due 2025-12-05; clock frozen at 2026-01-10 puts it past due
    let service = service_at(2026, 1, 10);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    let reloaded = service.get_plan(&plan.id).await.unwrap();
    assert_eq!(
        reloaded.installment(1).unwrap().status,
        InstallmentStatus::Overdue
    );
    assert_eq!(
        reloaded.installment(2).unwrap().status,
        InstallmentStatus::Overdue
    );
    // Due 2026-02-05, still in the future
    assert_eq!(
        reloaded.installment(3).unwrap().status,
        InstallmentStatus::Pending
    );
}

#[tokio::test]
async fn test_overdue_installment_can_be_paid() {
    let service = service_at(2026, 1, 10);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    let receipt = service
        .pay_installment(&plan.id, 1, exact_payment(), &caller("user-1"))
        .await
        .unwrap();
    assert_eq!(receipt.installment.status, InstallmentStatus::Paid);
}

#[tokio::test]
async fn test_edit_preserves_paid_history() {
    let service = service_at(2025, 12, 1);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(5, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    service
        .pay_installment(&plan.id, 1, exact_payment(), &caller("user-1"))
        .await
        .unwrap();
    service
        .pay_installment(&plan.id, 2, exact_payment(), &caller("user-1"))
        .await
        .unwrap();

    // New terms: 5 fresh installments of 800 starting from a later date
    let edited = service
        .edit_plan(&plan.id, terms(5, dec!(800), date(2026, 1, 1), 10))
        .await
        .unwrap();

    assert_eq!(edited.installments.len(), 7);
    assert!(edited.installments[0].is_paid());
    assert!(edited.installments[1].is_paid());
    assert_eq!(edited.installments[0].installment_number, 1);
    assert_eq!(edited.installments[1].installment_number, 2);
    assert_eq!(edited.installments[0].actual_paid_amount, Some(dec!(1000)));

    let tail: Vec<i32> = edited.installments[2..]
        .iter()
        .map(|i| i.installment_number)
        .collect();
    assert_eq!(tail, vec![3, 4, 5, 6, 7]);
    assert!(edited.installments[2..].iter().all(|i| !i.is_paid()));
    assert_eq!(edited.installments[2].amount, dec!(800));
    assert_eq!(edited.installments[2].due_date, date(2026, 2, 10));
    assert_eq!(edited.terms.installment_amount, dec!(800));
}

#[tokio::test]
async fn test_edit_bumps_version() {
    let service = service_at(2025, 12, 1);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    let edited = service
        .edit_plan(&plan.id, terms(4, dec!(750), date(2025, 11, 1), 5))
        .await
        .unwrap();

    assert_eq!(edited.version, plan.version + 1);
}

#[tokio::test]
async fn test_delete_refused_once_any_installment_paid() {
    let service = service_at(2025, 12, 1);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    service
        .pay_installment(&plan.id, 1, exact_payment(), &caller("user-1"))
        .await
        .unwrap();

    let err = service.delete_plan(&plan.id).await.unwrap_err();
    assert!(matches!(err, AppError::HasPaidItems));

    // The plan is still there
    assert!(service.get_plan(&plan.id).await.is_ok());
}

#[tokio::test]
async fn test_delete_allowed_after_reversal() {
    let service = service_at(2025, 12, 1);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    service
        .pay_installment(&plan.id, 1, exact_payment(), &caller("user-1"))
        .await
        .unwrap();
    service.mark_unpaid(&plan.id, 1).await.unwrap();

    service.delete_plan(&plan.id).await.unwrap();
    let err = service.get_plan(&plan.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_list_filters_by_creator_and_manager() {
    let service = service_at(2025, 12, 1);
    service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("alice"),
        )
        .await
        .unwrap();
    service
        .create_plan(
            create_input(
                "cust-2",
                terms(3, dec!(500), date(2025, 11, 1), 5),
                Some("mgr-9"),
            ),
            &caller("bob"),
        )
        .await
        .unwrap();

    let all = service.list_plans(&PlanFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let filter = PlanFilter {
        created_by: Some("alice".to_string()),
        ..Default::default()
    };
    let mine = service.list_plans(&filter).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].customer_id, "cust-1");

    let filter = PlanFilter {
        manager_id: Some("mgr-9".to_string()),
        ..Default::default()
    };
    let managed = service.list_plans(&filter).await.unwrap();
    assert_eq!(managed.len(), 1);
    assert_eq!(managed[0].customer_id, "cust-2");
}

#[tokio::test]
async fn test_list_filters_by_settled() {
    let service = service_at(2025, 12, 1);
    let open_plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();
    let settled_plan = service
        .create_plan(
            create_input("cust-2", terms(2, dec!(600), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    // Settle the second plan with a single covering payment
    let mut input = exact_payment();
    input.custom_amount = Some(dec!(1200));
    service
        .pay_installment(&settled_plan.id, 1, input, &caller("user-1"))
        .await
        .unwrap();

    let filter = PlanFilter {
        settled: Some(true),
        ..Default::default()
    };
    let settled = service.list_plans(&filter).await.unwrap();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].id, settled_plan.id);
    assert!(summarize(&settled[0]).is_settled);

    let filter = PlanFilter {
        settled: Some(false),
        ..Default::default()
    };
    let open = service.list_plans(&filter).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, open_plan.id);
}

#[tokio::test]
async fn test_edit_rejects_invalid_terms() {
    let service = service_at(2025, 12, 1);
    let plan = service
        .create_plan(
            create_input("cust-1", terms(3, dec!(1000), date(2025, 11, 1), 5), None),
            &caller("user-1"),
        )
        .await
        .unwrap();

    let mut bad = terms(3, dec!(1000), date(2025, 11, 1), 5);
    bad.due_day = 40;
    let err = service.edit_plan(&plan.id, bad).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Plan untouched by the failed edit
    let reloaded = service.get_plan(&plan.id).await.unwrap();
    assert_eq!(reloaded.installments.len(), 3);
    assert_eq!(reloaded.version, 0);
}
