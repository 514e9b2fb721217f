use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::core::{AppError, Result};
use crate::modules::plans::models::{
    CustomerSnapshot, Installment, InstallmentPlan, InstallmentStatus, InstallmentUnit,
    PaymentMethod, PlanTerms, ProductSnapshot,
};
use crate::modules::plans::repositories::{matches_filter, PlanFilter, PlanStore};

/// MySQL-backed plan store.
///
/// One plan row plus its installment rows form the aggregate; every save
/// rewrites the installment rows inside a single transaction guarded by the
/// plan row's version column, which gives the per-aggregate atomicity the
/// engine relies on.
pub struct MySqlPlanStore {
    pool: MySqlPool,
}

impl MySqlPlanStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_installments(
        tx: &mut Transaction<'_, MySql>,
        plan_id: &str,
        installments: &[Installment],
    ) -> Result<()> {
        for installment in installments {
            sqlx::query(
                r#"
                INSERT INTO plan_installments (
                    plan_id, installment_number, amount, actual_paid_amount,
                    due_date, paid_date, status, payment_method, notes, paid_by
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(plan_id)
            .bind(installment.installment_number)
            .bind(installment.amount)
            .bind(installment.actual_paid_amount)
            .bind(installment.due_date)
            .bind(installment.paid_date)
            .bind(installment.status.to_string())
            .bind(installment.payment_method.map(|m| m.to_string()))
            .bind(&installment.notes)
            .bind(&installment.paid_by)
            .execute(tx.as_mut())
            .await
            .map_err(AppError::Database)?;
        }

        Ok(())
    }

    async fn load_installments(&self, plan_id: &str) -> Result<Vec<Installment>> {
        let rows = sqlx::query_as::<_, InstallmentRow>(
            r#"
            SELECT
                plan_id, installment_number, amount, actual_paid_amount,
                due_date, paid_date, status, payment_method, notes, paid_by
            FROM plan_installments
            WHERE plan_id = ?
            ORDER BY installment_number ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }
}

#[async_trait]
impl PlanStore for MySqlPlanStore {
    async fn insert(&self, plan: &InstallmentPlan) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO plans (
                id, customer_id, customer_name, customer_email, customer_phone,
                customer_address, customer_reference, product_name, product_description,
                total_amount, advance_amount, installment_count, installment_unit,
                installment_amount, start_date, due_day, manager_id, created_by,
                version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.customer_id)
        .bind(&plan.customer.name)
        .bind(&plan.customer.email)
        .bind(&plan.customer.phone)
        .bind(&plan.customer.address)
        .bind(&plan.customer.reference)
        .bind(&plan.product.name)
        .bind(&plan.product.description)
        .bind(plan.terms.total_amount)
        .bind(plan.terms.advance_amount)
        .bind(plan.terms.installment_count)
        .bind(plan.terms.unit.to_string())
        .bind(plan.terms.installment_amount)
        .bind(plan.terms.start_date)
        .bind(plan.terms.due_day)
        .bind(&plan.manager_id)
        .bind(&plan.created_by)
        .bind(plan.version)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(tx.as_mut())
        .await
        .map_err(AppError::Database)?;

        Self::insert_installments(&mut tx, &plan.id, &plan.installments).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<InstallmentPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT
                id, customer_id, customer_name, customer_email, customer_phone,
                customer_address, customer_reference, product_name, product_description,
                total_amount, advance_amount, installment_count, installment_unit,
                installment_amount, start_date, due_day, manager_id, created_by,
                version, created_at, updated_at
            FROM plans
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let installments = self.load_installments(id).await?;
        Ok(Some(row.into_plan(installments)?))
    }

    async fn save(&self, plan: &mut InstallmentPlan) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE plans
            SET
                customer_name = ?, customer_email = ?, customer_phone = ?,
                customer_address = ?, customer_reference = ?,
                product_name = ?, product_description = ?,
                total_amount = ?, advance_amount = ?, installment_count = ?,
                installment_unit = ?, installment_amount = ?, start_date = ?,
                due_day = ?, manager_id = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&plan.customer.name)
        .bind(&plan.customer.email)
        .bind(&plan.customer.phone)
        .bind(&plan.customer.address)
        .bind(&plan.customer.reference)
        .bind(&plan.product.name)
        .bind(&plan.product.description)
        .bind(plan.terms.total_amount)
        .bind(plan.terms.advance_amount)
        .bind(plan.terms.installment_count)
        .bind(plan.terms.unit.to_string())
        .bind(plan.terms.installment_amount)
        .bind(plan.terms.start_date)
        .bind(plan.terms.due_day)
        .bind(&plan.manager_id)
        .bind(plan.updated_at)
        .bind(&plan.id)
        .bind(plan.version)
        .execute(tx.as_mut())
        .await
        .map_err(AppError::Database)?
        .rows_affected();

        if rows_affected == 0 {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM plans WHERE id = ?")
                .bind(&plan.id)
                .fetch_one(tx.as_mut())
                .await
                .map_err(AppError::Database)?;

            return if exists == 0 {
                Err(AppError::not_found(format!("Plan {}", plan.id)))
            } else {
                Err(AppError::conflict(format!(
                    "Plan {} was modified concurrently",
                    plan.id
                )))
            };
        }

        sqlx::query("DELETE FROM plan_installments WHERE plan_id = ?")
            .bind(&plan.id)
            .execute(tx.as_mut())
            .await
            .map_err(AppError::Database)?;

        Self::insert_installments(&mut tx, &plan.id, &plan.installments).await?;

        tx.commit().await.map_err(AppError::Database)?;
        plan.version += 1;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("DELETE FROM plan_installments WHERE plan_id = ?")
            .bind(id)
            .execute(tx.as_mut())
            .await
            .map_err(AppError::Database)?;

        let rows_affected = sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id)
            .execute(tx.as_mut())
            .await
            .map_err(AppError::Database)?
            .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::not_found(format!("Plan {}", id)));
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn list(&self, filter: &PlanFilter) -> Result<Vec<InstallmentPlan>> {
        // Creator/manager scope narrows in SQL; the derived settled filter is
        // applied on the loaded aggregates.
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT
                id, customer_id, customer_name, customer_email, customer_phone,
                customer_address, customer_reference, product_name, product_description,
                total_amount, advance_amount, installment_count, installment_unit,
                installment_amount, start_date, due_day, manager_id, created_by,
                version, created_at, updated_at
            FROM plans
            WHERE (? IS NULL OR created_by = ?)
              AND (? IS NULL OR manager_id = ?)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&filter.created_by)
        .bind(&filter.created_by)
        .bind(&filter.manager_id)
        .bind(&filter.manager_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let mut plans = Vec::with_capacity(rows.len());
        for row in rows {
            let installments = self.load_installments(&row.id).await?;
            let plan = row.into_plan(installments)?;
            if matches_filter(&plan, filter) {
                plans.push(plan);
            }
        }

        Ok(plans)
    }
}

/// Database row for the plans table
#[derive(sqlx::FromRow)]
struct PlanRow {
    id: String,
    customer_id: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    customer_address: Option<String>,
    customer_reference: Option<String>,
    product_name: String,
    product_description: Option<String>,
    total_amount: rust_decimal::Decimal,
    advance_amount: rust_decimal::Decimal,
    installment_count: u32,
    installment_unit: String,
    installment_amount: rust_decimal::Decimal,
    start_date: chrono::NaiveDate,
    due_day: u32,
    manager_id: Option<String>,
    created_by: String,
    version: i64,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

impl PlanRow {
    fn into_plan(self, installments: Vec<Installment>) -> Result<InstallmentPlan> {
        let unit = InstallmentUnit::try_from(self.installment_unit).map_err(AppError::Internal)?;

        Ok(InstallmentPlan {
            id: self.id,
            customer_id: self.customer_id,
            customer: CustomerSnapshot {
                name: self.customer_name,
                email: self.customer_email,
                phone: self.customer_phone,
                address: self.customer_address,
                reference: self.customer_reference,
            },
            product: ProductSnapshot {
                name: self.product_name,
                description: self.product_description,
            },
            terms: PlanTerms {
                total_amount: self.total_amount,
                advance_amount: self.advance_amount,
                installment_count: self.installment_count,
                unit,
                installment_amount: self.installment_amount,
                start_date: self.start_date,
                due_day: self.due_day,
            },
            manager_id: self.manager_id,
            created_by: self.created_by,
            installments,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database row for the plan_installments table
#[derive(sqlx::FromRow)]
struct InstallmentRow {
    #[allow(dead_code)]
    plan_id: String,
    installment_number: i32,
    amount: rust_decimal::Decimal,
    actual_paid_amount: Option<rust_decimal::Decimal>,
    due_date: chrono::NaiveDate,
    paid_date: Option<chrono::NaiveDateTime>,
    status: String,
    payment_method: Option<String>,
    notes: Option<String>,
    paid_by: Option<String>,
}

impl TryFrom<InstallmentRow> for Installment {
    type Error = AppError;

    fn try_from(row: InstallmentRow) -> Result<Self> {
        let status = InstallmentStatus::try_from(row.status).map_err(AppError::Internal)?;
        let payment_method = row
            .payment_method
            .map(PaymentMethod::try_from)
            .transpose()
            .map_err(AppError::Internal)?;

        Ok(Installment {
            installment_number: row.installment_number,
            amount: row.amount,
            actual_paid_amount: row.actual_paid_amount,
            due_date: row.due_date,
            paid_date: row.paid_date,
            status,
            payment_method,
            notes: row.notes,
            paid_by: row.paid_by,
        })
    }
}
