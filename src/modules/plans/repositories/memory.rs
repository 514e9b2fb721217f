use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::{AppError, Result};
use crate::modules::plans::models::InstallmentPlan;
use crate::modules::plans::repositories::{PlanFilter, PlanStore};

use super::matches_filter;

/// In-memory plan store with the same optimistic-versioning semantics as the
/// MySQL store. Backs deterministic service-level tests.
#[derive(Default)]
pub struct MemoryPlanStore {
    plans: RwLock<HashMap<String, InstallmentPlan>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn insert(&self, plan: &InstallmentPlan) -> Result<()> {
        let mut plans = self
            .plans
            .write()
            .map_err(|_| AppError::internal("Plan store lock poisoned"))?;

        if plans.contains_key(&plan.id) {
            return Err(AppError::conflict(format!(
                "Plan {} already exists",
                plan.id
            )));
        }

        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<InstallmentPlan>> {
        let plans = self
            .plans
            .read()
            .map_err(|_| AppError::internal("Plan store lock poisoned"))?;
        Ok(plans.get(id).cloned())
    }

    async fn save(&self, plan: &mut InstallmentPlan) -> Result<()> {
        let mut plans = self
            .plans
            .write()
            .map_err(|_| AppError::internal("Plan store lock poisoned"))?;

        let stored = plans
            .get(&plan.id)
            .ok_or_else(|| AppError::not_found(format!("Plan {}", plan.id)))?;

        if stored.version != plan.version {
            return Err(AppError::conflict(format!(
                "Plan {} was modified concurrently (expected version {}, found {})",
                plan.id, plan.version, stored.version
            )));
        }

        plan.version += 1;
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut plans = self
            .plans
            .write()
            .map_err(|_| AppError::internal("Plan store lock poisoned"))?;

        plans
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(format!("Plan {}", id)))
    }

    async fn list(&self, filter: &PlanFilter) -> Result<Vec<InstallmentPlan>> {
        let plans = self
            .plans
            .read()
            .map_err(|_| AppError::internal("Plan store lock poisoned"))?;

        let mut result: Vec<InstallmentPlan> = plans
            .values()
            .filter(|plan| matches_filter(plan, filter))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(result)
    }
}
