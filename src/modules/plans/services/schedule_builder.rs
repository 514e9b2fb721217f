use chrono::{Datelike, Days, Months, NaiveDate};
use tracing::info;

use crate::core::{AppError, Result};
use crate::modules::plans::models::{Installment, InstallmentUnit, PlanTerms};

/// Builds the ordered list of pending line items from plan terms, and rebuilds
/// it on plan edit while preserving already-paid history.
pub struct ScheduleBuilder;

impl ScheduleBuilder {
    /// Generate the full schedule for a new plan.
    ///
    /// Installment #1 falls due one calendar month after the start date,
    /// anchored to the plan's due day, regardless of unit — an intentional
    /// grace period before the first payment. Later items step by the unit.
    pub fn build(terms: &PlanTerms) -> Result<Vec<Installment>> {
        terms.validate()?;

        let first_due = Self::first_due_date(terms.start_date, terms.due_day)?;

        let mut installments = Vec::with_capacity(terms.installment_count as usize);
        for i in 1..=terms.installment_count {
            let due_date = Self::due_date_at(first_due, i, terms.unit, terms.due_day)?;
            installments.push(Installment::new(
                i as i32,
                terms.installment_amount,
                due_date,
            )?);
        }

        Ok(installments)
    }

    /// Regenerate the schedule after a plan edit.
    ///
    /// Paid items are kept verbatim in their original relative order and
    /// renumbered 1..k; everything unpaid is discarded and replaced by
    /// `installment_count` fresh pending items numbered k+1.. with dates seeded
    /// from the new terms. An edit can never alter paid history, only the
    /// unpaid tail.
    pub fn rebuild(existing: Vec<Installment>, terms: &PlanTerms) -> Result<Vec<Installment>> {
        terms.validate()?;

        let paid: Vec<Installment> = existing.into_iter().filter(|i| i.is_paid()).collect();
        let paid_count = paid.len();

        let mut installments = Vec::with_capacity(paid_count + terms.installment_count as usize);
        for (idx, mut installment) in paid.into_iter().enumerate() {
            installment.installment_number = (idx + 1) as i32;
            installments.push(installment);
        }

        let first_due = Self::first_due_date(terms.start_date, terms.due_day)?;
        for i in 1..=terms.installment_count {
            let due_date = Self::due_date_at(first_due, i, terms.unit, terms.due_day)?;
            installments.push(Installment::new(
                (paid_count as u32 + i) as i32,
                terms.installment_amount,
                due_date,
            )?);
        }

        info!(
            paid_kept = paid_count,
            regenerated = terms.installment_count,
            "Rebuilt installment schedule"
        );

        Ok(installments)
    }

    /// Due date of installment #1: start date advanced by one month, then
    /// anchored to the due day (clamped to the month's length).
    fn first_due_date(start_date: NaiveDate, due_day: u32) -> Result<NaiveDate> {
        let next_month = start_date
            .checked_add_months(Months::new(1))
            .ok_or_else(|| AppError::validation("Start date out of range"))?;
        Ok(Self::anchor_day(next_month, due_day))
    }

    /// Due date of installment `i` (1-based), stepping from the first due date
    fn due_date_at(
        first_due: NaiveDate,
        i: u32,
        unit: InstallmentUnit,
        due_day: u32,
    ) -> Result<NaiveDate> {
        let offset = i - 1;
        let date = match unit {
            InstallmentUnit::Days => first_due.checked_add_days(Days::new(offset as u64)),
            InstallmentUnit::Weeks => first_due.checked_add_days(Days::new(offset as u64 * 7)),
            InstallmentUnit::Months => first_due
                .checked_add_months(Months::new(offset))
                // Re-anchor so month-length drift (e.g. through February)
                // does not stick for later months
                .map(|d| Self::anchor_day(d, due_day)),
        };

        date.ok_or_else(|| AppError::validation("Due date out of range"))
    }

    /// Set the day-of-month, clamping to the last day of shorter months
    fn anchor_day(date: NaiveDate, due_day: u32) -> NaiveDate {
        let mut day = due_day.min(31);
        loop {
            if let Some(anchored) = NaiveDate::from_ymd_opt(date.year(), date.month(), day) {
                return anchored;
            }
            day -= 1;
        }
    }
}
