use chrono::{Days, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::Result;
use crate::modules::plans::models::{Installment, InstallmentPlan, PaymentMethod};

/// Details of the payment that produced the surplus/shortfall, used to stamp
/// installments cleared by a full-payoff cascade.
#[derive(Debug, Clone)]
pub struct TriggerPayment {
    pub installment_number: i32,
    pub method: PaymentMethod,
    pub paid_by: String,
    pub notes: Option<String>,
    pub now: NaiveDateTime,
}

/// Outcome of a redistribution pass, surfaced to the caller for display
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionSummary {
    /// Nothing to distribute
    Unchanged,
    /// No remaining items; the difference became a new line item
    Appended {
        installment_number: i32,
        amount: Decimal,
    },
    /// Surplus covered everything left; remaining items were cleared at zero
    AllRemainingCleared {
        cleared_count: usize,
        cleared_total: Decimal,
        /// Surplus beyond the cleared total; dropped unless configured to carry
        leftover: Decimal,
        appended: Option<(i32, Decimal)>,
    },
    /// Surplus shaved off each remaining item
    SurplusSpread {
        difference: Decimal,
        per_item: Decimal,
        affected: usize,
    },
    /// Shortfall added onto each remaining item
    ShortfallSpread {
        difference: Decimal,
        per_item: Decimal,
        affected: usize,
    },
}

impl DistributionSummary {
    /// Human-readable summary for API responses
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Unchanged => None,
            Self::Appended {
                installment_number,
                amount,
            } => Some(format!(
                "Remaining balance of {} carried into new installment #{}",
                amount, installment_number
            )),
            Self::AllRemainingCleared {
                cleared_count,
                cleared_total,
                leftover,
                appended,
            } => {
                let mut msg = format!(
                    "All {} remaining installments marked paid; total cleared = {}",
                    cleared_count, cleared_total
                );
                if *leftover > Decimal::ZERO {
                    match appended {
                        Some((number, amount)) => {
                            msg.push_str(&format!(
                                "; leftover {} carried into new installment #{}",
                                amount, number
                            ));
                        }
                        None => {
                            msg.push_str(&format!("; leftover surplus of {} not carried", leftover));
                        }
                    }
                }
                Some(msg)
            }
            Self::SurplusSpread {
                difference,
                per_item,
                affected,
            } => Some(format!(
                "Surplus of {} spread across {} remaining installments ({} each)",
                difference, affected, per_item
            )),
            Self::ShortfallSpread {
                difference,
                per_item,
                affected,
            } => Some(format!(
                "Shortfall of {} spread across {} remaining installments (+{} each)",
                difference.abs(),
                affected,
                per_item
            )),
        }
    }
}

/// Spreads a signed payment difference across the line items whose number is
/// strictly greater than the one just paid.
///
/// Positive difference = surplus (reduces later burdens, or clears everything),
/// negative = shortfall (increases later burdens). Per-item amounts always use
/// ceiling division to whole currency units, so the sum distributed is never
/// less than the triggering difference and the plan never loses money to
/// rounding.
pub struct Redistributor {
    settings: EngineConfig,
}

impl Redistributor {
    pub fn new(settings: EngineConfig) -> Self {
        Self { settings }
    }

    /// Apply the difference from an initial payment (full algorithm: append,
    /// full-payoff cascade, zero-paid reopening).
    pub fn apply(
        &self,
        plan: &mut InstallmentPlan,
        trigger: &TriggerPayment,
        difference: Decimal,
    ) -> Result<DistributionSummary> {
        if difference == Decimal::ZERO {
            return Ok(DistributionSummary::Unchanged);
        }

        // Later items still open for money: pending/overdue, plus previously
        // surplus-covered items that can be reopened.
        let remaining: Vec<usize> = plan
            .installments
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                item.installment_number > trigger.installment_number
                    && (item.is_open() || item.is_zero_amount_paid())
            })
            .map(|(idx, _)| idx)
            .collect();

        if remaining.is_empty() {
            return self.append_difference(plan, difference.abs());
        }

        if difference > Decimal::ZERO {
            self.spread_surplus(plan, &remaining, trigger, difference)
        } else {
            Ok(Self::spread_shortfall(plan, &remaining, difference))
        }
    }

    /// Delta correction after a payment update: a soft proportional nudge on
    /// strictly-later open items only. Deliberately simpler than `apply` — no
    /// full-payoff cascade and no reopening of surplus-covered items, so a
    /// bookkeeping correction cannot flip sibling items between paid and
    /// pending.
    pub fn nudge(
        plan: &mut InstallmentPlan,
        paid_number: i32,
        delta: Decimal,
    ) -> DistributionSummary {
        if delta == Decimal::ZERO {
            return DistributionSummary::Unchanged;
        }

        let later_open: Vec<usize> = plan
            .installments
            .iter()
            .enumerate()
            .filter(|(_, item)| item.installment_number > paid_number && item.is_open())
            .map(|(idx, _)| idx)
            .collect();

        if later_open.is_empty() {
            return DistributionSummary::Unchanged;
        }

        let per_item = ceil_split(delta.abs(), later_open.len());
        for &idx in &later_open {
            let item = &mut plan.installments[idx];
            if delta > Decimal::ZERO {
                item.amount = (item.amount - per_item).max(Decimal::ZERO);
            } else {
                item.amount += per_item;
            }
        }

        if delta > Decimal::ZERO {
            DistributionSummary::SurplusSpread {
                difference: delta,
                per_item,
                affected: later_open.len(),
            }
        } else {
            DistributionSummary::ShortfallSpread {
                difference: delta,
                per_item,
                affected: later_open.len(),
            }
        }
    }

    /// No remaining items: the difference becomes a new pending line item due
    /// 30 days after the last one.
    fn append_difference(
        &self,
        plan: &mut InstallmentPlan,
        amount: Decimal,
    ) -> Result<DistributionSummary> {
        let number = plan.next_installment_number();
        let due_date = Self::appended_due_date(plan)?;

        plan.installments
            .push(Installment::new(number, amount, due_date)?);

        info!(
            installment_number = number,
            amount = %amount,
            "Appended installment for undistributed balance"
        );

        Ok(DistributionSummary::Appended {
            installment_number: number,
            amount,
        })
    }

    fn appended_due_date(plan: &InstallmentPlan) -> Result<chrono::NaiveDate> {
        let last_due = plan
            .installments
            .last()
            .map(|i| i.due_date)
            .ok_or_else(|| crate::core::AppError::internal("Plan has no installments"))?;
        last_due
            .checked_add_days(Days::new(30))
            .ok_or_else(|| crate::core::AppError::validation("Due date out of range"))
    }

    fn spread_surplus(
        &self,
        plan: &mut InstallmentPlan,
        remaining: &[usize],
        trigger: &TriggerPayment,
        difference: Decimal,
    ) -> Result<DistributionSummary> {
        let total_remaining: Decimal = remaining
            .iter()
            .map(|&idx| plan.installments[idx].amount)
            .sum();

        if difference >= total_remaining {
            // Full payoff cascade: everything left is cleared at zero so the
            // triggering payment's actual amount is the only record of the cost.
            let note = trigger.notes.clone().unwrap_or_else(|| {
                format!(
                    "Paid in advance via surplus from installment #{}",
                    trigger.installment_number
                )
            });

            for &idx in remaining {
                plan.installments[idx].mark_covered_by_surplus(
                    Some(trigger.method),
                    note.clone(),
                    Some(trigger.paid_by.clone()),
                    trigger.now,
                );
            }

            let leftover = difference - total_remaining;
            let appended = if leftover > Decimal::ZERO && self.settings.carry_leftover_surplus {
                match self.append_difference(plan, leftover)? {
                    DistributionSummary::Appended {
                        installment_number,
                        amount,
                    } => Some((installment_number, amount)),
                    _ => None,
                }
            } else {
                if leftover > Decimal::ZERO {
                    warn!(
                        leftover = %leftover,
                        installment_number = trigger.installment_number,
                        "Surplus exceeds remaining balance; leftover not carried"
                    );
                }
                None
            };

            return Ok(DistributionSummary::AllRemainingCleared {
                cleared_count: remaining.len(),
                cleared_total: total_remaining,
                leftover,
                appended,
            });
        }

        let per_item = ceil_split(difference, remaining.len());
        for &idx in remaining {
            let item = &mut plan.installments[idx];
            if item.is_zero_amount_paid() {
                item.reopen_with_amount(per_item);
            } else if item.amount == Decimal::ZERO {
                item.amount = per_item;
            } else {
                item.amount = (item.amount - per_item).max(Decimal::ZERO);
            }
        }

        Ok(DistributionSummary::SurplusSpread {
            difference,
            per_item,
            affected: remaining.len(),
        })
    }

    fn spread_shortfall(
        plan: &mut InstallmentPlan,
        remaining: &[usize],
        difference: Decimal,
    ) -> DistributionSummary {
        let per_item = ceil_split(difference.abs(), remaining.len());
        for &idx in remaining {
            let item = &mut plan.installments[idx];
            if item.is_zero_amount_paid() {
                item.reopen_with_amount(per_item);
            } else {
                item.amount += per_item;
            }
        }

        DistributionSummary::ShortfallSpread {
            difference,
            per_item,
            affected: remaining.len(),
        }
    }
}

/// Ceiling division to whole currency units. Rounding up trades a small,
/// bounded overcollection (at most `count - 1` units per event) for the
/// guarantee that no fractional balance is ever silently lost.
fn ceil_split(total: Decimal, count: usize) -> Decimal {
    debug_assert!(total >= Decimal::ZERO);
    (total / Decimal::from(count)).ceil()
}
