//! Warehouse movements: take, return and receipt of stock

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::{ReceiptPriority, ReturnPriority, TakePriority};
use super::pool::PartPool;
use super::release::release;
use super::reorganize::{reorganize, ReorganizeOutcome};
use crate::models::{JobRef, OrderBasketHandle, StockUnit};
use crate::validation::normalize_price;

/// Result of taking stock for a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TakeOutcome {
    /// Units consumed; clamped to what was available
    pub taken: usize,
    pub unit_ids: Vec<Uuid>,
    /// Reservations dropped because the take already covered them
    pub released: usize,
}

/// Result of giving stock back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReturnOutcome {
    pub returned: usize,
    pub unit_ids: Vec<Uuid>,
    pub reorganized: ReorganizeOutcome,
}

/// One receipt line of a shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub quantity: usize,
    pub price: Decimal,
    #[serde(default)]
    pub vendor2: bool,
    /// Placed order (invoice) the shipment belongs to
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

/// Result of receiving a shipment line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiptOutcome {
    /// Order lines marked as arrived
    pub matched: usize,
    /// Units created because no order line was waiting
    pub created: usize,
    pub unit_ids: Vec<Uuid>,
    pub reorganized: ReorganizeOutcome,
}

/// Consume up to `quantity` arrived units for the job.
///
/// The job's own reservations go first, then free stock. When free stock was
/// used, as many of the job's remaining reservations are released.
pub fn take(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    job: JobRef,
    quantity: usize,
) -> TakeOutcome {
    let mut outcome = TakeOutcome::default();
    if quantity == 0 {
        return outcome;
    }
    pool.register_job(job);

    let candidates = pool.ranked(
        |u| u.in_warehouse() && u.reserved_id.map_or(true, |r| r == job.id),
        &TakePriority { job_id: job.id },
    );

    let mut from_free = 0;
    for id in candidates.into_iter().take(quantity) {
        if let Some(unit) = pool.unit_mut(id) {
            if unit.reserved_id.is_none() {
                from_free += 1;
            }
            unit.job_id = Some(job.id);
            unit.reserved_id = Some(job.id);
            outcome.unit_ids.push(id);
        }
    }
    outcome.taken = outcome.unit_ids.len();

    if from_free > 0 {
        outcome.released = release(pool, basket, job.id, from_free).released;
    }

    tracing::info!(
        part_id = %pool.part_id(),
        job_id = %job.id,
        requested = quantity,
        taken = outcome.taken,
        released = outcome.released,
        "Took stock"
    );

    outcome
}

/// Give back up to `quantity` units the job consumed, then reorganize
pub fn return_items(pool: &mut PartPool, job_id: Uuid, quantity: usize) -> ReturnOutcome {
    let mut outcome = ReturnOutcome::default();
    if quantity == 0 {
        return outcome;
    }

    let consumed = pool.ranked(|u| u.job_id == Some(job_id), &ReturnPriority);
    for id in consumed.into_iter().take(quantity) {
        if let Some(unit) = pool.unit_mut(id) {
            unit.job_id = None;
            unit.reserved_id = None;
            outcome.unit_ids.push(id);
        }
    }
    outcome.returned = outcome.unit_ids.len();

    tracing::info!(
        part_id = %pool.part_id(),
        job_id = %job_id,
        requested = quantity,
        returned = outcome.returned,
        "Returned stock"
    );

    if outcome.returned > 0 {
        outcome.reorganized = reorganize(pool, Some(job_id));
    }
    outcome
}

/// Receive a shipment line, matching waiting order lines before creating units
pub fn receive(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    line: &ReceiptLine,
) -> ReceiptOutcome {
    let mut outcome = ReceiptOutcome::default();
    if line.quantity == 0 {
        return outcome;
    }
    pool.register_basket(basket);

    let price = normalize_price(line.price);
    let now = pool.now();
    let policy = ReceiptPriority {
        order: line.order_id,
        current_order: basket.id,
    };
    let waiting = pool.ranked(|u| !u.arrived && u.is_unconsumed(), &policy);

    for id in waiting.into_iter().take(line.quantity) {
        if let Some(unit) = pool.unit_mut(id) {
            unit.arrived = true;
            unit.price = price;
            unit.vendor2 = line.vendor2;
            unit.date = now;
            outcome.unit_ids.push(id);
        }
    }
    outcome.matched = outcome.unit_ids.len();

    for _ in outcome.matched..line.quantity {
        let unit = StockUnit::received(pool.part_id(), price, line.vendor2, now);
        outcome.unit_ids.push(pool.push(unit));
        outcome.created += 1;
    }

    tracing::info!(
        part_id = %pool.part_id(),
        order_id = ?line.order_id,
        matched = outcome.matched,
        created = outcome.created,
        "Received stock"
    );

    outcome.reorganized = reorganize(pool, None);
    outcome
}
