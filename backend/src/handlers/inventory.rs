//! HTTP handlers for stock reservation endpoints

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::models::OrderBasket;
use shared::reservation::{
    DemandOutcome, FreeOrderOutcome, PoolSummary, ReceiptLine, ReceiptOutcome, ReleaseOutcome,
    ReorganizeOutcome, ReserveOutcome, ReturnOutcome, TakeOutcome,
};
use shared::validation::{validate_invoice_number, validate_price, validate_quantity};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::reservation::{BatchOutcome, JobProsthesis, PartMutation, PlacedOrders};
use crate::services::ReservationService;
use crate::AppState;

/// Quantity of a part for a job
#[derive(Debug, Deserialize, Validate)]
pub struct JobQuantityInput {
    pub job_id: Uuid,
    pub quantity: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReorganizeInput {
    #[serde(default)]
    pub job_id: Option<Uuid>,
}

/// One shipment line
#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveInput {
    pub quantity: i32,
    pub price: Decimal,
    #[serde(default)]
    pub vendor2: bool,
    pub order_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FreeOrderInput {
    pub quantity: i32,
}

/// Invoice numbers by vendor for the orders being placed
#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderInput {
    #[serde(default)]
    pub invoices: HashMap<Uuid, String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceInput {
    #[validate(length(min = 1, max = 100))]
    pub invoice_number: String,
}

#[derive(Debug, Deserialize)]
pub struct ProsthesisInput {
    pub prosthesis_id: Uuid,
}

fn service(state: &AppState) -> ReservationService {
    ReservationService::new(state.db.clone(), state.config.inventory.clone())
}

fn quantity(value: i32) -> AppResult<usize> {
    validate_quantity(value).map_err(|message| AppError::validation("quantity", message))
}

/// Reserve more units of a part for a job
pub async fn reserve(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<JobQuantityInput>,
) -> AppResult<Json<PartMutation<ReserveOutcome>>> {
    input.validate()?;
    let quantity = quantity(input.quantity)?;
    let result = service(&state).reserve(part_id, input.job_id, quantity).await?;
    Ok(Json(result))
}

/// Release a job's reservations on a part
pub async fn release(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<JobQuantityInput>,
) -> AppResult<Json<PartMutation<ReleaseOutcome>>> {
    input.validate()?;
    let quantity = quantity(input.quantity)?;
    let result = service(&state).release(part_id, input.job_id, quantity).await?;
    Ok(Json(result))
}

/// Re-deal a part's reservations
pub async fn reorganize(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    input: Option<Json<ReorganizeInput>>,
) -> AppResult<Json<PartMutation<ReorganizeOutcome>>> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let result = service(&state).reorganize(part_id, input.job_id).await?;
    Ok(Json(result))
}

/// Hand out stock to a job
pub async fn take(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<JobQuantityInput>,
) -> AppResult<Json<PartMutation<TakeOutcome>>> {
    input.validate()?;
    let quantity = quantity(input.quantity)?;
    let result = service(&state)
        .take(part_id, input.job_id, quantity, input.comment)
        .await?;
    Ok(Json(result))
}

/// Return stock from a job
pub async fn return_items(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<JobQuantityInput>,
) -> AppResult<Json<PartMutation<ReturnOutcome>>> {
    input.validate()?;
    let quantity = quantity(input.quantity)?;
    let result = service(&state)
        .return_items(part_id, input.job_id, quantity, input.comment)
        .await?;
    Ok(Json(result))
}

/// Receive a shipment line
pub async fn receive(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<PartMutation<ReceiptOutcome>>> {
    input.validate()?;
    validate_price(input.price).map_err(|message| AppError::validation("price", message))?;
    let line = ReceiptLine {
        quantity: quantity(input.quantity)?,
        price: input.price,
        vendor2: input.vendor2,
        order_id: input.order_id,
    };
    let result = service(&state).receive(part_id, line, input.comment).await?;
    Ok(Json(result))
}

/// Set how many units of a part a job needs
pub async fn set_job_demand(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<JobQuantityInput>,
) -> AppResult<Json<PartMutation<DemandOutcome>>> {
    input.validate()?;
    let desired = quantity(input.quantity)?;
    let result = service(&state)
        .set_job_demand(part_id, input.job_id, desired)
        .await?;
    Ok(Json(result))
}

/// Set the free-order lines of a part
pub async fn edit_free_order(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<FreeOrderInput>,
) -> AppResult<Json<PartMutation<FreeOrderOutcome>>> {
    let desired = quantity(input.quantity)?;
    let result = service(&state).edit_free_order(part_id, desired).await?;
    Ok(Json(result))
}

/// Unit counts of a part by state
pub async fn stock_summary(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
) -> AppResult<Json<PoolSummary>> {
    let summary = service(&state).stock_summary(part_id).await?;
    Ok(Json(summary))
}

/// Top up every part to its minimum remainder
pub async fn check_minimum_remainder(
    State(state): State<AppState>,
) -> AppResult<Json<BatchOutcome>> {
    let result = service(&state).check_minimum_remainder().await?;
    Ok(Json(result))
}

/// Move reservations onto free-order lines
pub async fn reconcile_free_orders(State(state): State<AppState>) -> AppResult<Json<BatchOutcome>> {
    let result = service(&state).reconcile_free_orders().await?;
    Ok(Json(result))
}

/// Trim the current order
pub async fn trim_excess_current_order(
    State(state): State<AppState>,
) -> AppResult<Json<BatchOutcome>> {
    let result = service(&state).trim_excess_current_order().await?;
    Ok(Json(result))
}

/// Place the current order
pub async fn place_order(
    State(state): State<AppState>,
    input: Option<Json<PlaceOrderInput>>,
) -> AppResult<Json<PlacedOrders>> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    for number in input.invoices.values() {
        validate_invoice_number(number)
            .map_err(|message| AppError::validation("invoices", message))?;
    }
    let result = service(&state).place_order(input.invoices).await?;
    Ok(Json(result))
}

/// Attach an invoice number to a placed order
pub async fn tag_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<InvoiceInput>,
) -> AppResult<Json<OrderBasket>> {
    input.validate()?;
    validate_invoice_number(&input.invoice_number)
        .map_err(|message| AppError::validation("invoice_number", message))?;
    let order = service(&state)
        .tag_invoice(order_id, input.invoice_number)
        .await?;
    Ok(Json(order))
}

/// Assign a prosthesis to a job
pub async fn assign_prosthesis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(input): Json<ProsthesisInput>,
) -> AppResult<Json<JobProsthesis>> {
    let result = service(&state)
        .assign_prosthesis(job_id, input.prosthesis_id)
        .await?;
    Ok(Json(result))
}
