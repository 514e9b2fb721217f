use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::{AppError, Result, SystemClock};
use crate::middleware::Caller;
use crate::modules::plans::models::{
    CustomerSnapshot, Installment, InstallmentPlan, InstallmentUnit, PaymentMethod, PlanTerms,
    ProductSnapshot,
};
use crate::modules::plans::repositories::{MySqlPlanStore, PlanFilter};
use crate::modules::plans::services::{
    summarize, CreatePlanInput, PaymentInput, PaymentReceipt, PlanService,
};

/// Request body for POST /plans
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub customer_id: String,
    pub customer: CustomerPayload,
    pub product: ProductPayload,
    pub total_amount: String,
    pub advance_amount: String,
    pub installment_count: u32,
    pub installment_unit: String,
    pub installment_amount: String,
    pub start_date: NaiveDate,
    pub due_day: u32,
    pub manager_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub name: String,
    pub description: Option<String>,
}

/// Request body for PUT /plans/{id} — new financial terms for the unpaid tail
#[derive(Debug, Deserialize)]
pub struct EditPlanRequest {
    pub total_amount: String,
    pub advance_amount: String,
    pub installment_count: u32,
    pub installment_unit: String,
    pub installment_amount: String,
    pub start_date: NaiveDate,
    pub due_day: u32,
}

/// Request body for payment recording and correction
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub payment_method: String,
    pub notes: Option<String>,
    pub custom_amount: Option<String>,
    pub due_date: Option<String>,
}

/// Query parameters for GET /plans
#[derive(Debug, Deserialize)]
pub struct ListPlansQuery {
    pub created_by: Option<String>,
    pub manager_id: Option<String>,
    pub settled: Option<bool>,
}

/// Response for a single installment line item
#[derive(Debug, Serialize)]
pub struct InstallmentResponse {
    pub installment_number: i32,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_paid_amount: Option<String>,
    pub due_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_date: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_by: Option<String>,
}

impl From<Installment> for InstallmentResponse {
    fn from(installment: Installment) -> Self {
        Self {
            installment_number: installment.installment_number,
            amount: installment.amount.to_string(),
            actual_paid_amount: installment.actual_paid_amount.map(|a| a.to_string()),
            due_date: installment.due_date.to_string(),
            paid_date: installment.paid_date.map(|d| d.to_string()),
            status: installment.status.display_status().to_string(),
            payment_method: installment.payment_method.map(|m| m.to_string()),
            notes: installment.notes,
            paid_by: installment.paid_by,
        }
    }
}

/// Derived per-plan summary (read-only projection)
#[derive(Debug, Serialize)]
pub struct PlanSummaryResponse {
    pub total_installments: usize,
    pub paid_installments: usize,
    pub unpaid_installments: usize,
    pub is_settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<InstallmentResponse>,
    pub remaining_amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_installment: Option<String>,
}

/// Full plan response
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_reference: Option<String>,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
    pub total_amount: String,
    pub advance_amount: String,
    pub installment_count: u32,
    pub installment_unit: String,
    pub installment_amount: String,
    pub start_date: String,
    pub due_day: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
    pub created_by: String,
    pub installments: Vec<InstallmentResponse>,
    pub summary: PlanSummaryResponse,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InstallmentPlan> for PlanResponse {
    fn from(plan: InstallmentPlan) -> Self {
        let summary = summarize(&plan);
        let summary = PlanSummaryResponse {
            total_installments: summary.total_installments,
            paid_installments: summary.paid_installments,
            unpaid_installments: summary.unpaid_installments,
            is_settled: summary.is_settled,
            next_due: summary.next_due.map(InstallmentResponse::from),
            remaining_amount: summary.remaining_amount.to_string(),
            projected_installment: summary.projected_installment.map(|a| a.to_string()),
        };

        Self {
            id: plan.id,
            customer_id: plan.customer_id,
            customer_name: plan.customer.name,
            customer_email: plan.customer.email,
            customer_phone: plan.customer.phone,
            customer_address: plan.customer.address,
            customer_reference: plan.customer.reference,
            product_name: plan.product.name,
            product_description: plan.product.description,
            total_amount: plan.terms.total_amount.to_string(),
            advance_amount: plan.terms.advance_amount.to_string(),
            installment_count: plan.terms.installment_count,
            installment_unit: plan.terms.unit.to_string(),
            installment_amount: plan.terms.installment_amount.to_string(),
            start_date: plan.terms.start_date.to_string(),
            due_day: plan.terms.due_day,
            manager_id: plan.manager_id,
            created_by: plan.created_by,
            installments: plan
                .installments
                .into_iter()
                .map(InstallmentResponse::from)
                .collect(),
            summary,
            created_at: plan.created_at.to_string(),
            updated_at: plan.updated_at.to_string(),
        }
    }
}

/// Response for payment recording and correction
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub installment: InstallmentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_summary: Option<String>,
}

impl From<PaymentReceipt> for PaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            installment: receipt.installment.into(),
            distribution_summary: receipt.distribution.message(),
        }
    }
}

fn parse_amount(raw: &str, field: &str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .map_err(|_| AppError::invalid_amount(format!("Invalid {}: {}", field, raw)))
}

fn parse_terms(
    total_amount: &str,
    advance_amount: &str,
    installment_count: u32,
    installment_unit: &str,
    installment_amount: &str,
    start_date: NaiveDate,
    due_day: u32,
) -> Result<PlanTerms> {
    let unit =
        InstallmentUnit::try_from(installment_unit.to_string()).map_err(AppError::Validation)?;

    Ok(PlanTerms {
        total_amount: parse_amount(total_amount, "total_amount")?,
        advance_amount: parse_amount(advance_amount, "advance_amount")?,
        installment_count,
        unit,
        installment_amount: parse_amount(installment_amount, "installment_amount")?,
        start_date,
        due_day,
    })
}

fn parse_payment_input(request: PaymentRequest) -> Result<PaymentInput> {
    let method =
        PaymentMethod::try_from(request.payment_method).map_err(AppError::Validation)?;

    let custom_amount = request
        .custom_amount
        .as_deref()
        .map(|raw| parse_amount(raw, "custom_amount"))
        .transpose()?;

    Ok(PaymentInput {
        method,
        notes: request.notes,
        custom_amount,
        due_date: request.due_date,
    })
}

fn service(pool: &web::Data<MySqlPool>, engine: &web::Data<EngineConfig>) -> PlanService {
    PlanService::new(
        Arc::new(MySqlPlanStore::new(pool.get_ref().clone())),
        Arc::new(SystemClock),
        *engine.get_ref(),
    )
}

/// POST /plans
pub async fn create_plan(
    request: web::Json<CreatePlanRequest>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    caller: Caller,
) -> Result<HttpResponse> {
    caller.require_write()?;

    let request = request.into_inner();
    let terms = parse_terms(
        &request.total_amount,
        &request.advance_amount,
        request.installment_count,
        &request.installment_unit,
        &request.installment_amount,
        request.start_date,
        request.due_day,
    )?;

    let input = CreatePlanInput {
        customer_id: request.customer_id,
        customer: CustomerSnapshot {
            name: request.customer.name,
            email: request.customer.email,
            phone: request.customer.phone,
            address: request.customer.address,
            reference: request.customer.reference,
        },
        product: ProductSnapshot {
            name: request.product.name,
            description: request.product.description,
        },
        terms,
        manager_id: request.manager_id,
    };

    let plan = service(&pool, &engine).create_plan(input, &caller).await?;
    Ok(HttpResponse::Created().json(PlanResponse::from(plan)))
}

/// PUT /plans/{plan_id}
pub async fn edit_plan(
    plan_id: web::Path<String>,
    request: web::Json<EditPlanRequest>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    caller: Caller,
) -> Result<HttpResponse> {
    caller.require_write()?;

    let request = request.into_inner();
    let terms = parse_terms(
        &request.total_amount,
        &request.advance_amount,
        request.installment_count,
        &request.installment_unit,
        &request.installment_amount,
        request.start_date,
        request.due_day,
    )?;

    let plan = service(&pool, &engine).edit_plan(&plan_id, terms).await?;
    Ok(HttpResponse::Ok().json(PlanResponse::from(plan)))
}

/// GET /plans
pub async fn list_plans(
    query: web::Query<ListPlansQuery>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    _caller: Caller,
) -> Result<HttpResponse> {
    let filter = PlanFilter {
        created_by: query.created_by.clone(),
        manager_id: query.manager_id.clone(),
        settled: query.settled,
    };

    let plans = service(&pool, &engine).list_plans(&filter).await?;
    let responses: Vec<PlanResponse> = plans.into_iter().map(PlanResponse::from).collect();
    Ok(HttpResponse::Ok().json(responses))
}

/// GET /plans/{plan_id}
pub async fn get_plan(
    plan_id: web::Path<String>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    _caller: Caller,
) -> Result<HttpResponse> {
    let plan = service(&pool, &engine).get_plan(&plan_id).await?;
    Ok(HttpResponse::Ok().json(PlanResponse::from(plan)))
}

/// DELETE /plans/{plan_id}
pub async fn delete_plan(
    plan_id: web::Path<String>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    caller: Caller,
) -> Result<HttpResponse> {
    caller.require_write()?;

    service(&pool, &engine).delete_plan(&plan_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /plans/{plan_id}/installments/{number}/payment
pub async fn pay_installment(
    path: web::Path<(String, i32)>,
    request: web::Json<PaymentRequest>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    caller: Caller,
) -> Result<HttpResponse> {
    caller.require_write()?;

    let (plan_id, number) = path.into_inner();
    let input = parse_payment_input(request.into_inner())?;

    let receipt = service(&pool, &engine)
        .pay_installment(&plan_id, number, input, &caller)
        .await?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(receipt)))
}

/// PUT /plans/{plan_id}/installments/{number}/payment
pub async fn update_payment(
    path: web::Path<(String, i32)>,
    request: web::Json<PaymentRequest>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    caller: Caller,
) -> Result<HttpResponse> {
    caller.require_write()?;

    let (plan_id, number) = path.into_inner();
    let input = parse_payment_input(request.into_inner())?;

    let receipt = service(&pool, &engine)
        .update_payment(&plan_id, number, input, &caller)
        .await?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(receipt)))
}

/// DELETE /plans/{plan_id}/installments/{number}/payment
pub async fn mark_unpaid(
    path: web::Path<(String, i32)>,
    pool: web::Data<MySqlPool>,
    engine: web::Data<EngineConfig>,
    caller: Caller,
) -> Result<HttpResponse> {
    caller.require_write()?;

    let (plan_id, number) = path.into_inner();
    let installment = service(&pool, &engine).mark_unpaid(&plan_id, number).await?;
    Ok(HttpResponse::Ok().json(InstallmentResponse::from(installment)))
}

/// Configure plan routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/plans")
            .route("", web::post().to(create_plan))
            .route("", web::get().to(list_plans))
            .route("/{plan_id}", web::get().to(get_plan))
            .route("/{plan_id}", web::put().to(edit_plan))
            .route("/{plan_id}", web::delete().to(delete_plan))
            .route(
                "/{plan_id}/installments/{number}/payment",
                web::post().to(pay_installment),
            )
            .route(
                "/{plan_id}/installments/{number}/payment",
                web::put().to(update_payment),
            )
            .route(
                "/{plan_id}/installments/{number}/payment",
                web::delete().to(mark_unpaid),
            ),
    );
}
