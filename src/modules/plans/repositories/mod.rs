pub mod memory;
pub mod mysql;

use async_trait::async_trait;

use crate::core::Result;
use crate::modules::plans::models::InstallmentPlan;

pub use memory::MemoryPlanStore;
pub use mysql::MySqlPlanStore;

/// Scope filter for plan listings
#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub created_by: Option<String>,
    pub manager_id: Option<String>,
    /// true = only fully settled plans, false = only plans with open items
    pub settled: Option<bool>,
}

/// Whole-aggregate persistence for installment plans.
///
/// `save` writes the entire aggregate back atomically and enforces the
/// optimistic version check; two racing writers cannot silently clobber each
/// other. No operation spans more than one plan.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Persist a freshly created plan (version 0)
    async fn insert(&self, plan: &InstallmentPlan) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<InstallmentPlan>>;

    /// Save the whole aggregate. Bumps `plan.version` on success; fails with
    /// `Conflict` when the stored version no longer matches.
    async fn save(&self, plan: &mut InstallmentPlan) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn list(&self, filter: &PlanFilter) -> Result<Vec<InstallmentPlan>>;
}

/// Settled-ness is derived from the item list, so all stores apply the filter
/// on the loaded aggregate rather than in the query.
pub(crate) fn matches_filter(plan: &InstallmentPlan, filter: &PlanFilter) -> bool {
    if let Some(created_by) = &filter.created_by {
        if &plan.created_by != created_by {
            return false;
        }
    }

    if let Some(manager_id) = &filter.manager_id {
        if plan.manager_id.as_deref() != Some(manager_id.as_str()) {
            return false;
        }
    }

    if let Some(settled) = filter.settled {
        let is_settled = plan.installments.iter().all(|i| i.is_paid());
        if is_settled != settled {
            return false;
        }
    }

    true
}
