pub mod plan_service;
pub mod projection;
pub mod redistribution;
pub mod schedule_builder;

pub use plan_service::{CreatePlanInput, PaymentInput, PaymentReceipt, PlanService};
pub use projection::{summarize, PlanSummary};
pub use redistribution::{DistributionSummary, Redistributor, TriggerPayment};
pub use schedule_builder::ScheduleBuilder;
