use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::{AppError, Clock, Result};
use crate::middleware::Caller;
use crate::modules::plans::models::{
    CustomerSnapshot, Installment, InstallmentPlan, PaymentMethod, PlanTerms, ProductSnapshot,
};
use crate::modules::plans::repositories::{PlanFilter, PlanStore};
use crate::modules::plans::services::{
    DistributionSummary, Redistributor, ScheduleBuilder, TriggerPayment,
};

/// Validated input for plan creation
#[derive(Debug, Clone)]
pub struct CreatePlanInput {
    pub customer_id: String,
    pub customer: CustomerSnapshot,
    pub product: ProductSnapshot,
    pub terms: PlanTerms,
    pub manager_id: Option<String>,
}

/// Validated input for recording or correcting a payment
#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub notes: Option<String>,
    /// Overrides the scheduled amount; must be positive when present
    pub custom_amount: Option<Decimal>,
    /// Due date override; unparseable values are ignored, never an error
    pub due_date: Option<String>,
}

/// Result of a payment operation, for caller display
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub installment: Installment,
    pub distribution: DistributionSummary,
}

/// Business logic for installment plans: creation, schedule edits, payment
/// recording with redistribution, payment corrections, reversal, and deletion.
///
/// Every operation loads one aggregate, mutates it in memory, and persists it
/// back in a single atomic save; nothing partially commits.
pub struct PlanService {
    store: Arc<dyn PlanStore>,
    clock: Arc<dyn Clock>,
    redistributor: Redistributor,
}

impl PlanService {
    pub fn new(store: Arc<dyn PlanStore>, clock: Arc<dyn Clock>, engine: EngineConfig) -> Self {
        Self {
            store,
            clock,
            redistributor: Redistributor::new(engine),
        }
    }

    /// Create a plan with its full generated schedule
    pub async fn create_plan(
        &self,
        input: CreatePlanInput,
        caller: &Caller,
    ) -> Result<InstallmentPlan> {
        let installments = ScheduleBuilder::build(&input.terms)?;

        let plan = InstallmentPlan::new(
            input.customer_id,
            input.customer,
            input.product,
            input.terms,
            input.manager_id,
            caller.user_id.clone(),
            installments,
            self.clock.now(),
        )?;

        self.store.insert(&plan).await?;

        info!(
            plan_id = plan.id.as_str(),
            customer_id = plan.customer_id.as_str(),
            installments = plan.installments.len(),
            "Created installment plan"
        );

        Ok(plan)
    }

    /// Regenerate the unpaid tail of a plan from new terms. Paid history is
    /// kept verbatim and renumbered to the front.
    pub async fn edit_plan(&self, plan_id: &str, terms: PlanTerms) -> Result<InstallmentPlan> {
        let mut plan = self.load(plan_id).await?;

        let existing = std::mem::take(&mut plan.installments);
        plan.installments = ScheduleBuilder::rebuild(existing, &terms)?;
        plan.terms = terms;
        plan.updated_at = self.clock.now();
        plan.check_numbering()?;

        self.store.save(&mut plan).await?;

        info!(
            plan_id = plan_id,
            installments = plan.installments.len(),
            "Edited installment plan"
        );

        Ok(plan)
    }

    /// Load a plan with overdue statuses recomputed for display
    pub async fn get_plan(&self, plan_id: &str) -> Result<InstallmentPlan> {
        let mut plan = self.load(plan_id).await?;
        plan.refresh_overdue(self.clock.today());
        Ok(plan)
    }

    pub async fn list_plans(&self, filter: &PlanFilter) -> Result<Vec<InstallmentPlan>> {
        let mut plans = self.store.list(filter).await?;
        let today = self.clock.today();
        for plan in &mut plans {
            plan.refresh_overdue(today);
        }
        Ok(plans)
    }

    /// Delete a plan, refused once any installment has been paid
    pub async fn delete_plan(&self, plan_id: &str) -> Result<()> {
        let plan = self.load(plan_id).await?;

        if plan.has_paid_installments() {
            return Err(AppError::HasPaidItems);
        }

        self.store.delete(plan_id).await?;

        info!(plan_id = plan_id, "Deleted installment plan");
        Ok(())
    }

    /// Mark one pending/overdue installment paid, redistributing any
    /// surplus or shortfall across the later open items.
    pub async fn pay_installment(
        &self,
        plan_id: &str,
        number: i32,
        input: PaymentInput,
        caller: &Caller,
    ) -> Result<PaymentReceipt> {
        if let Some(amount) = input.custom_amount {
            if amount <= Decimal::ZERO {
                return Err(AppError::invalid_amount(format!(
                    "Custom amount must be positive, got {}",
                    amount
                )));
            }
        }

        let now = self.clock.now();
        let mut plan = self.load(plan_id).await?;
        plan.refresh_overdue(now.date());

        let due_override = Self::parse_due_override(input.due_date.as_deref());

        let installment = plan
            .installment_mut(number)
            .ok_or_else(|| AppError::not_found(format!("Installment {}", number)))?;

        if let Some(due_date) = due_override {
            installment.due_date = due_date;
        }

        let scheduled = installment.amount;
        let actual_paid = input.custom_amount.unwrap_or(scheduled);
        installment.mark_paid(
            actual_paid,
            input.method,
            input.notes.clone(),
            &caller.user_id,
            now,
        )?;

        // Scheduled value before this call is the baseline for the delta
        let difference = actual_paid - scheduled;
        let trigger = TriggerPayment {
            installment_number: number,
            method: input.method,
            paid_by: caller.user_id.clone(),
            notes: input.notes,
            now,
        };
        let distribution = self.redistributor.apply(&mut plan, &trigger, difference)?;

        plan.check_numbering()?;
        plan.updated_at = now;
        self.store.save(&mut plan).await?;

        info!(
            plan_id = plan_id,
            installment_number = number,
            actual_paid = %actual_paid,
            difference = %difference,
            "Recorded installment payment"
        );

        let installment = plan
            .installment(number)
            .cloned()
            .ok_or_else(|| AppError::internal("Paid installment vanished from plan"))?;

        Ok(PaymentReceipt {
            installment,
            distribution,
        })
    }

    /// Retroactively correct an already-paid installment and delta-nudge the
    /// later open items.
    pub async fn update_payment(
        &self,
        plan_id: &str,
        number: i32,
        input: PaymentInput,
        caller: &Caller,
    ) -> Result<PaymentReceipt> {
        if let Some(amount) = input.custom_amount {
            if amount <= Decimal::ZERO {
                return Err(AppError::invalid_amount(format!(
                    "Custom amount must be positive, got {}",
                    amount
                )));
            }
        }

        let now = self.clock.now();
        let mut plan = self.load(plan_id).await?;

        let due_override = Self::parse_due_override(input.due_date.as_deref());

        let installment = plan
            .installment_mut(number)
            .ok_or_else(|| AppError::not_found(format!("Installment {}", number)))?;

        if !installment.is_paid() {
            return Err(AppError::NotPaid(number));
        }

        // Previously recorded truth, baseline for the correction delta
        let old_paid = installment.actual_paid_amount.unwrap_or(installment.amount);
        let new_paid = input.custom_amount.unwrap_or(installment.amount);

        if let Some(due_date) = due_override {
            installment.due_date = due_date;
        }
        installment.payment_method = Some(input.method);
        installment.notes = input.notes;
        installment.paid_by = Some(caller.user_id.clone());
        installment.actual_paid_amount = Some(new_paid);

        let delta = new_paid - old_paid;
        let distribution = Redistributor::nudge(&mut plan, number, delta);

        plan.updated_at = now;
        self.store.save(&mut plan).await?;

        info!(
            plan_id = plan_id,
            installment_number = number,
            old_paid = %old_paid,
            new_paid = %new_paid,
            "Updated installment payment"
        );

        let installment = plan
            .installment(number)
            .cloned()
            .ok_or_else(|| AppError::internal("Updated installment vanished from plan"))?;

        Ok(PaymentReceipt {
            installment,
            distribution,
        })
    }

    /// Undo a single paid installment. Redistribution previously caused by
    /// that payment is left in place on sibling items.
    pub async fn mark_unpaid(&self, plan_id: &str, number: i32) -> Result<Installment> {
        let mut plan = self.load(plan_id).await?;

        let installment = plan
            .installment_mut(number)
            .ok_or_else(|| AppError::not_found(format!("Installment {}", number)))?;

        installment.revert_to_pending()?;
        installment.refresh_overdue(self.clock.today());

        plan.updated_at = self.clock.now();
        self.store.save(&mut plan).await?;

        info!(
            plan_id = plan_id,
            installment_number = number,
            "Reverted installment to pending"
        );

        plan.installment(number)
            .cloned()
            .ok_or_else(|| AppError::internal("Reverted installment vanished from plan"))
    }

    async fn load(&self, plan_id: &str) -> Result<InstallmentPlan> {
        self.store
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Plan {}", plan_id)))
    }

    /// Lenient due-date override parsing. The override is a convenience, so a
    /// bad value is logged and dropped rather than failing the payment.
    fn parse_due_override(raw: Option<&str>) -> Option<NaiveDate> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }

        let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
            .or_else(|_| {
                chrono::DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc().date())
            });

        match parsed {
            Ok(date) => Some(date),
            Err(_) => {
                warn!(raw = raw, "Ignoring unparseable due date override");
                None
            }
        }
    }
}
