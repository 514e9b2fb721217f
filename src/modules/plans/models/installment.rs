use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};

/// One scheduled payment line within an installment plan.
///
/// Owned exclusively by its plan; `installment_number` is the sole ordering and
/// targeting key (never an array index, since items can be appended).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    /// Positive, unique within a plan, strictly increasing in list order
    pub installment_number: i32,
    /// Currently scheduled amount; mutable by redistribution even before payment
    pub amount: Decimal,
    /// Amount actually collected; present only once paid
    pub actual_paid_amount: Option<Decimal>,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDateTime>,
    pub status: InstallmentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub paid_by: Option<String>,
}

/// Installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    /// Not yet paid
    Pending,
    /// Payment received
    Paid,
    /// Due date passed without payment
    Overdue,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }

    /// Presentation-level status used by API responses
    pub fn display_status(&self) -> &'static str {
        match self {
            Self::Pending => "active",
            Self::Paid => "completed",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for InstallmentStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            _ => Err(format!("Invalid installment status: {}", value)),
        }
    }
}

/// How an installment was collected; meaningful only once paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Wallet,
    Cheque,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Wallet => "wallet",
            Self::Cheque => "cheque",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "cash" => Ok(Self::Cash),
            "bank_transfer" => Ok(Self::BankTransfer),
            "wallet" => Ok(Self::Wallet),
            "cheque" => Ok(Self::Cheque),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid payment method: {}", value)),
        }
    }
}

impl Installment {
    /// Create a fresh pending installment
    pub fn new(installment_number: i32, amount: Decimal, due_date: NaiveDate) -> Result<Self> {
        if installment_number < 1 {
            return Err(AppError::validation(format!(
                "Installment number must be positive, got {}",
                installment_number
            )));
        }

        if amount < Decimal::ZERO {
            return Err(AppError::validation(
                "Installment amount cannot be negative",
            ));
        }

        Ok(Self {
            installment_number,
            amount,
            actual_paid_amount: None,
            due_date,
            paid_date: None,
            status: InstallmentStatus::Pending,
            payment_method: None,
            notes: None,
            paid_by: None,
        })
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    /// Pending or overdue, i.e. still awaiting collection
    pub fn is_open(&self) -> bool {
        !self.is_paid()
    }

    /// Paid "for free" because an earlier surplus fully covered it.
    /// Such items are re-admitted into redistribution so a later shortfall
    /// can legitimately reopen them.
    pub fn is_zero_amount_paid(&self) -> bool {
        self.is_paid() && self.amount == Decimal::ZERO
    }

    /// Record a collection against this installment.
    ///
    /// `amount` is deliberately left at its pre-payment scheduled value so the
    /// caller can compute the surplus/shortfall afterwards.
    pub fn mark_paid(
        &mut self,
        actual_paid: Decimal,
        method: PaymentMethod,
        notes: Option<String>,
        paid_by: &str,
        now: NaiveDateTime,
    ) -> Result<()> {
        if self.is_paid() {
            return Err(AppError::AlreadyPaid(self.installment_number));
        }

        self.status = InstallmentStatus::Paid;
        self.actual_paid_amount = Some(actual_paid);
        self.paid_date = Some(now);
        self.payment_method = Some(method);
        self.notes = notes;
        self.paid_by = Some(paid_by.to_string());

        Ok(())
    }

    /// Mark this installment as absorbed by a surplus from an earlier payment.
    /// Its cost already lives in the triggering payment's actual amount, so both
    /// `amount` and `actual_paid_amount` drop to zero to avoid double counting.
    pub fn mark_covered_by_surplus(
        &mut self,
        method: Option<PaymentMethod>,
        notes: String,
        paid_by: Option<String>,
        now: NaiveDateTime,
    ) {
        self.status = InstallmentStatus::Paid;
        self.amount = Decimal::ZERO;
        self.actual_paid_amount = Some(Decimal::ZERO);
        self.paid_date = Some(now);
        self.payment_method = method;
        self.notes = Some(notes);
        self.paid_by = paid_by;
    }

    /// Undo a payment, restoring the actually collected figure as the scheduled
    /// amount ("what you see is what you get back").
    pub fn revert_to_pending(&mut self) -> Result<()> {
        if !self.is_paid() {
            return Err(AppError::NotPaid(self.installment_number));
        }

        if let Some(actual) = self.actual_paid_amount {
            self.amount = actual;
        }
        self.status = InstallmentStatus::Pending;
        self.actual_paid_amount = None;
        self.paid_date = None;
        self.payment_method = None;
        self.notes = None;
        self.paid_by = None;

        Ok(())
    }

    /// Reopen a zero-amount paid item with a new scheduled amount.
    /// Used when a later shortfall has to claw back a surplus-covered item.
    pub fn reopen_with_amount(&mut self, amount: Decimal) {
        self.status = InstallmentStatus::Pending;
        self.amount = amount;
        self.actual_paid_amount = None;
        self.paid_date = None;
        self.payment_method = None;
        self.notes = None;
        self.paid_by = None;
    }

    /// Recompute the derived `overdue` status against the given day.
    /// The stored value is a cache, never ground truth.
    pub fn refresh_overdue(&mut self, today: NaiveDate) {
        match self.status {
            InstallmentStatus::Paid => {}
            _ => {
                self.status = if self.due_date < today {
                    InstallmentStatus::Overdue
                } else {
                    InstallmentStatus::Pending
                };
            }
        }
    }
}
