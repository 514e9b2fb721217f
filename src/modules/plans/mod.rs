pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Installment, InstallmentPlan, InstallmentStatus, InstallmentUnit, PaymentMethod};
pub use repositories::{MemoryPlanStore, MySqlPlanStore, PlanFilter, PlanStore};
pub use services::{PlanService, Redistributor, ScheduleBuilder};
