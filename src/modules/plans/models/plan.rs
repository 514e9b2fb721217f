use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Result};
use crate::modules::plans::models::Installment;

/// Calendar unit between consecutive installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentUnit {
    Days,
    Weeks,
    Months,
}

impl InstallmentUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
        }
    }
}

impl std::fmt::Display for InstallmentUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for InstallmentUnit {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "days" => Ok(Self::Days),
            "weeks" => Ok(Self::Weeks),
            "months" => Ok(Self::Months),
            _ => Err(format!("Invalid installment unit: {}", value)),
        }
    }
}

/// Customer details denormalized at plan creation; never synced back to any
/// customer master record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub reference: Option<String>,
}

/// Product details denormalized at plan creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub description: Option<String>,
}

/// Financial terms of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTerms {
    pub total_amount: Decimal,
    /// Paid upfront, outside the line-item list
    pub advance_amount: Decimal,
    /// Originally requested count; the list can grow past it via appends
    pub installment_count: u32,
    pub unit: InstallmentUnit,
    /// Scheduled amount per installment
    pub installment_amount: Decimal,
    pub start_date: NaiveDate,
    /// Day-of-month anchor (1-31) used when unit = months
    pub due_day: u32,
}

impl PlanTerms {
    pub fn validate(&self) -> Result<()> {
        if self.total_amount < Decimal::ZERO {
            return Err(AppError::validation("Total amount cannot be negative"));
        }

        if self.advance_amount < Decimal::ZERO {
            return Err(AppError::validation("Advance amount cannot be negative"));
        }

        if self.installment_count == 0 {
            return Err(AppError::validation(
                "Installment count must be at least 1",
            ));
        }

        if self.installment_amount < Decimal::ZERO {
            return Err(AppError::validation(
                "Installment amount cannot be negative",
            ));
        }

        if !(1..=31).contains(&self.due_day) {
            return Err(AppError::validation(format!(
                "Due day must be between 1 and 31, got {}",
                self.due_day
            )));
        }

        Ok(())
    }
}

/// Aggregate root: one customer's purchase agreement split into dated payments.
///
/// Every mutation loads the whole aggregate, changes it in memory, and saves it
/// back in one atomic write. `version` backs the optimistic concurrency check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub id: String,
    /// External customer id; a customer may hold several plans
    pub customer_id: String,
    pub customer: CustomerSnapshot,
    pub product: ProductSnapshot,
    pub terms: PlanTerms,
    pub manager_id: Option<String>,
    /// Identifies who is authorized to mutate the plan
    pub created_by: String,
    /// Ordered by ascending installment_number
    pub installments: Vec<Installment>,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl InstallmentPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        customer_id: String,
        customer: CustomerSnapshot,
        product: ProductSnapshot,
        terms: PlanTerms,
        manager_id: Option<String>,
        created_by: String,
        installments: Vec<Installment>,
        now: NaiveDateTime,
    ) -> Result<Self> {
        terms.validate()?;

        let plan = Self {
            id: Uuid::new_v4().to_string(),
            customer_id,
            customer,
            product,
            terms,
            manager_id,
            created_by,
            installments,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        plan.check_numbering()?;

        Ok(plan)
    }

    pub fn installment(&self, number: i32) -> Option<&Installment> {
        self.installments
            .iter()
            .find(|i| i.installment_number == number)
    }

    pub fn installment_mut(&mut self, number: i32) -> Option<&mut Installment> {
        self.installments
            .iter_mut()
            .find(|i| i.installment_number == number)
    }

    pub fn has_paid_installments(&self) -> bool {
        self.installments.iter().any(|i| i.is_paid())
    }

    /// Next free installment number for appends
    pub fn next_installment_number(&self) -> i32 {
        self.installments
            .last()
            .map(|i| i.installment_number + 1)
            .unwrap_or(1)
    }

    /// Recompute derived overdue statuses against the given day
    pub fn refresh_overdue(&mut self, today: NaiveDate) {
        for installment in &mut self.installments {
            installment.refresh_overdue(today);
        }
    }

    /// Numbering invariant: unique, strictly increasing in list order
    pub fn check_numbering(&self) -> Result<()> {
        for pair in self.installments.windows(2) {
            if pair[1].installment_number <= pair[0].installment_number {
                return Err(AppError::internal(format!(
                    "Installment numbering violated: {} followed by {}",
                    pair[0].installment_number, pair[1].installment_number
                )));
            }
        }
        Ok(())
    }
}
