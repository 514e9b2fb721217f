pub mod installment;
pub mod plan;

pub use installment::{Installment, InstallmentStatus, PaymentMethod};
pub use plan::{CustomerSnapshot, InstallmentPlan, InstallmentUnit, PlanTerms, ProductSnapshot};
