use rust_decimal::Decimal;
use serde::Serialize;

use crate::modules::plans::models::{Installment, InstallmentPlan};

/// Presentation-level summary derived from a plan on read. Never persisted;
/// in particular `projected_installment` is only a projection of what an even
/// re-split of the outstanding balance would look like.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub total_installments: usize,
    pub paid_installments: usize,
    pub unpaid_installments: usize,
    pub is_settled: bool,
    pub next_due: Option<Installment>,
    pub remaining_amount: Decimal,
    pub projected_installment: Option<Decimal>,
}

/// Derive the per-plan summary used by every read endpoint
pub fn summarize(plan: &InstallmentPlan) -> PlanSummary {
    let paid_installments = plan.installments.iter().filter(|i| i.is_paid()).count();
    let unpaid_installments = plan.installments.len() - paid_installments;

    let next_due = plan
        .installments
        .iter()
        .filter(|i| i.is_open())
        .min_by_key(|i| i.installment_number)
        .cloned();

    let total_paid: Decimal = plan
        .installments
        .iter()
        .filter_map(|i| i.actual_paid_amount)
        .sum();
    let remaining_amount = plan.terms.total_amount - plan.terms.advance_amount - total_paid;

    let projected_installment = if unpaid_installments > 0 {
        Some((remaining_amount / Decimal::from(unpaid_installments)).ceil())
    } else {
        None
    };

    PlanSummary {
        total_installments: plan.installments.len(),
        paid_installments,
        unpaid_installments,
        is_settled: unpaid_installments == 0,
        next_due,
        remaining_amount,
        projected_installment,
    }
}
