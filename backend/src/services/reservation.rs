//! Reservation service: one transaction per engine operation
//!
//! Every mutating call locks the current basket and the affected parts, runs
//! the engine on the loaded pools, settles the trailing consistency passes and
//! writes the change set back before committing. Write-write conflicts re-run
//! the whole transaction.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use shared::models::{InventoryLog, InventoryOperation, JobRef, OrderBasket, OrderBasketHandle};
use shared::reservation::{
    self as engine, ConsistencyReport, DemandOutcome, FreeOrderOutcome, PartPool, PoolSummary,
    ReceiptLine, ReceiptOutcome, ReleaseOutcome, ReorganizeOutcome, ReserveOutcome,
    ReturnOutcome, TakeOutcome, VendorGroup,
};
use shared::types::Region;
use shared::validation::validate_prosthesis_region;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::retry::retry_on_conflict;
use super::stock_store::{self, LockMode, OrderRow};
use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};

/// Reservation service over the stock tables
#[derive(Clone)]
pub struct ReservationService {
    db: PgPool,
    settings: InventoryConfig,
}

/// Result of an operation on one part
#[derive(Debug, Clone, Serialize)]
pub struct PartMutation<T> {
    pub part_id: Uuid,
    pub outcome: T,
    pub consistency: ConsistencyReport,
    pub summary: PoolSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<InventoryLog>,
}

/// Result of a pass over many parts
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub parts: usize,
    pub units: usize,
}

/// Result of placing the current basket
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrders {
    pub closed_orders: Vec<PlacedOrder>,
    pub opened: OrderBasket,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: OrderBasket,
    pub units: usize,
}

/// Prosthesis assignment of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobProsthesis {
    pub job_id: Uuid,
    pub prosthesis_id: Uuid,
    pub region: Region,
}

/// Warehouse log entry written with a part mutation
struct LogEntry {
    operation: InventoryOperation,
    job_id: Option<Uuid>,
    unit_ids: Vec<Uuid>,
    comment: Option<String>,
}

#[derive(Debug, FromRow)]
struct RegionRow {
    region: String,
}

fn parse_region(value: &str) -> AppResult<Region> {
    value
        .parse()
        .map_err(|_| AppError::Internal(format!("Unknown region '{}' in the database", value)))
}

/// Consume stock for a job; over-large requests are clamped, never rejected
fn take_step(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    job: JobRef,
    quantity: usize,
    comment: Option<&str>,
) -> (TakeOutcome, LogEntry) {
    let outcome = engine::take(pool, basket, job, quantity);
    let log = LogEntry {
        operation: InventoryOperation::Take,
        job_id: Some(job.id),
        unit_ids: outcome.unit_ids.clone(),
        comment: comment.map(str::to_string),
    };
    (outcome, log)
}

/// Give back what a job consumed, at most what it holds
fn return_step(
    pool: &mut PartPool,
    job: JobRef,
    quantity: usize,
    comment: Option<&str>,
) -> (ReturnOutcome, LogEntry) {
    pool.register_job(job);
    let outcome = engine::return_items(pool, job.id, quantity);
    let log = LogEntry {
        operation: InventoryOperation::Return,
        job_id: Some(job.id),
        unit_ids: outcome.unit_ids.clone(),
        comment: comment.map(str::to_string),
    };
    (outcome, log)
}

/// A receipt may only name an existing placed order
fn check_receipt_order(line: &ReceiptLine, named: Option<&OrderBasket>) -> AppResult<()> {
    let Some(order_id) = line.order_id else {
        return Ok(());
    };
    let order = named
        .filter(|order| order.id == order_id)
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
    if order.current {
        return Err(AppError::Conflict {
            resource: "order_id".to_string(),
            message: "Stock is received against placed orders only".to_string(),
        });
    }
    Ok(())
}

fn receipt_step(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    line: &ReceiptLine,
    comment: Option<&str>,
) -> (ReceiptOutcome, LogEntry) {
    let outcome = engine::receive(pool, basket, line);
    let log = LogEntry {
        operation: InventoryOperation::Reception,
        job_id: None,
        unit_ids: outcome.unit_ids.clone(),
        comment: comment.map(str::to_string),
    };
    (outcome, log)
}

/// Where a vendor group of a placed basket is filed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// The closed basket itself
    Reuse(Uuid),
    Create,
}

/// The first group keeps the closed basket so it never stays behind empty
fn placements(basket_id: Uuid, groups: Vec<VendorGroup>) -> Vec<(Placement, VendorGroup)> {
    groups
        .into_iter()
        .enumerate()
        .map(|(n, group)| {
            let target = if n == 0 {
                Placement::Reuse(basket_id)
            } else {
                Placement::Create
            };
            (target, group)
        })
        .collect()
}

impl ReservationService {
    /// Create a new ReservationService instance
    pub fn new(db: PgPool, settings: InventoryConfig) -> Self {
        Self { db, settings }
    }

    // ========================================================================
    // Part operations
    // ========================================================================

    /// Reserve `quantity` more units of a part for a job
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
    ) -> AppResult<PartMutation<ReserveOutcome>> {
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.reserve_once(part_id, job_id, quantity)
        })
        .await
    }

    async fn reserve_once(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
    ) -> AppResult<PartMutation<ReserveOutcome>> {
        let (mut tx, basket, mut pool) = self.open_part(part_id).await?;
        let job = stock_store::find_job(&mut tx, job_id).await?;
        let outcome = engine::reserve(&mut pool, &basket, job, quantity);
        self.finish(tx, &basket, pool, outcome, None).await
    }

    /// Release up to `quantity` of a job's reservations on a part
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
    ) -> AppResult<PartMutation<ReleaseOutcome>> {
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.release_once(part_id, job_id, quantity)
        })
        .await
    }

    async fn release_once(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
    ) -> AppResult<PartMutation<ReleaseOutcome>> {
        let (mut tx, basket, mut pool) = self.open_part(part_id).await?;
        let job = stock_store::find_job(&mut tx, job_id).await?;
        let outcome = engine::release(&mut pool, &basket, job.id, quantity);
        self.finish(tx, &basket, pool, outcome, None).await
    }

    /// Re-deal a part's reservations by need-by date
    #[tracing::instrument(skip(self))]
    pub async fn reorganize(
        &self,
        part_id: Uuid,
        job_id: Option<Uuid>,
    ) -> AppResult<PartMutation<ReorganizeOutcome>> {
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.reorganize_once(part_id, job_id)
        })
        .await
    }

    async fn reorganize_once(
        &self,
        part_id: Uuid,
        job_id: Option<Uuid>,
    ) -> AppResult<PartMutation<ReorganizeOutcome>> {
        let (mut tx, basket, mut pool) = self.open_part(part_id).await?;
        let focus = match job_id {
            Some(id) => {
                let job = stock_store::find_job(&mut tx, id).await?;
                pool.register_job(job);
                Some(job.id)
            }
            None => None,
        };
        let outcome = engine::reorganize(&mut pool, focus);
        self.finish(tx, &basket, pool, outcome, None).await
    }

    /// Hand out arrived stock to a job
    #[tracing::instrument(skip(self))]
    pub async fn take(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
        comment: Option<String>,
    ) -> AppResult<PartMutation<TakeOutcome>> {
        let comment = comment.as_deref();
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.take_once(part_id, job_id, quantity, comment)
        })
        .await
    }

    async fn take_once(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
        comment: Option<&str>,
    ) -> AppResult<PartMutation<TakeOutcome>> {
        let (mut tx, basket, mut pool) = self.open_part(part_id).await?;
        let job = stock_store::find_job(&mut tx, job_id).await?;
        let (outcome, log) = take_step(&mut pool, &basket, job, quantity, comment);
        self.finish(tx, &basket, pool, outcome, Some(log)).await
    }

    /// Take back stock a job consumed
    #[tracing::instrument(skip(self))]
    pub async fn return_items(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
        comment: Option<String>,
    ) -> AppResult<PartMutation<ReturnOutcome>> {
        let comment = comment.as_deref();
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.return_once(part_id, job_id, quantity, comment)
        })
        .await
    }

    async fn return_once(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        quantity: usize,
        comment: Option<&str>,
    ) -> AppResult<PartMutation<ReturnOutcome>> {
        let (mut tx, basket, mut pool) = self.open_part(part_id).await?;
        let job = stock_store::find_job(&mut tx, job_id).await?;
        let (outcome, log) = return_step(&mut pool, job, quantity, comment);
        self.finish(tx, &basket, pool, outcome, Some(log)).await
    }

    /// Book a shipment line into the warehouse
    #[tracing::instrument(skip(self))]
    pub async fn receive(
        &self,
        part_id: Uuid,
        line: ReceiptLine,
        comment: Option<String>,
    ) -> AppResult<PartMutation<ReceiptOutcome>> {
        let (line, comment) = (&line, comment.as_deref());
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.receive_once(part_id, line, comment)
        })
        .await
    }

    async fn receive_once(
        &self,
        part_id: Uuid,
        line: &ReceiptLine,
        comment: Option<&str>,
    ) -> AppResult<PartMutation<ReceiptOutcome>> {
        let mut tx = self.db.begin().await?;
        let basket = stock_store::current_basket(&mut tx).await?.handle();
        let named = match line.order_id {
            Some(order_id) => stock_store::lookup_order(&mut tx, order_id).await?,
            None => None,
        };
        check_receipt_order(line, named.as_ref())?;
        let mut pool = stock_store::load_pool(&mut tx, part_id, LockMode::ForUpdate).await?;

        let (outcome, log) = receipt_step(&mut pool, &basket, line, comment);
        self.finish(tx, &basket, pool, outcome, Some(log)).await
    }

    /// Bring a job's reservation count on a part to `desired`
    #[tracing::instrument(skip(self))]
    pub async fn set_job_demand(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        desired: usize,
    ) -> AppResult<PartMutation<DemandOutcome>> {
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.set_job_demand_once(part_id, job_id, desired)
        })
        .await
    }

    async fn set_job_demand_once(
        &self,
        part_id: Uuid,
        job_id: Uuid,
        desired: usize,
    ) -> AppResult<PartMutation<DemandOutcome>> {
        let (mut tx, basket, mut pool) = self.open_part(part_id).await?;
        let job = stock_store::find_job(&mut tx, job_id).await?;
        let outcome = engine::set_job_demand(&mut pool, &basket, job, desired);
        self.finish(tx, &basket, pool, outcome, None).await
    }

    /// Set the number of free-order lines of a part in the current basket
    #[tracing::instrument(skip(self))]
    pub async fn edit_free_order(
        &self,
        part_id: Uuid,
        desired: usize,
    ) -> AppResult<PartMutation<FreeOrderOutcome>> {
        retry_on_conflict(self.settings.conflict_retries, "Part", move || {
            self.edit_free_order_once(part_id, desired)
        })
        .await
    }

    async fn edit_free_order_once(
        &self,
        part_id: Uuid,
        desired: usize,
    ) -> AppResult<PartMutation<FreeOrderOutcome>> {
        let (tx, basket, mut pool) = self.open_part(part_id).await?;
        let outcome = engine::edit_free_order(&mut pool, &basket, desired);
        self.finish(tx, &basket, pool, outcome, None).await
    }

    /// Unit counts of a part by state
    #[tracing::instrument(skip(self))]
    pub async fn stock_summary(&self, part_id: Uuid) -> AppResult<PoolSummary> {
        let mut conn = self.db.acquire().await?;
        let basket = match stock_store::find_current_basket(&mut conn).await? {
            Some(basket) => basket.handle(),
            None => OrderBasketHandle {
                id: Uuid::nil(),
                date: Utc::now(),
            },
        };
        let pool = stock_store::load_pool(&mut conn, part_id, LockMode::Snapshot).await?;
        Ok(pool.summary(&basket))
    }

    // ========================================================================
    // Passes over all parts
    // ========================================================================

    /// Top up every part with a floor to its minimum remainder
    #[tracing::instrument(skip(self))]
    pub async fn check_minimum_remainder(&self) -> AppResult<BatchOutcome> {
        retry_on_conflict(self.settings.conflict_retries, "Stock", move || {
            self.batch_once(Pass::MinimumRemainder)
        })
        .await
    }

    /// Move reservations onto free-order lines across the current basket
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_free_orders(&self) -> AppResult<BatchOutcome> {
        retry_on_conflict(self.settings.conflict_retries, "Stock", move || {
            self.batch_once(Pass::ReconcileFreeOrders)
        })
        .await
    }

    /// Drop speculative lines of the current basket that stock no longer needs
    #[tracing::instrument(skip(self))]
    pub async fn trim_excess_current_order(&self) -> AppResult<BatchOutcome> {
        retry_on_conflict(self.settings.conflict_retries, "Stock", move || {
            self.batch_once(Pass::TrimCurrentOrder)
        })
        .await
    }

    async fn batch_once(&self, pass: Pass) -> AppResult<BatchOutcome> {
        let mut tx = self.db.begin().await?;
        let basket = stock_store::current_basket(&mut tx).await?.handle();

        let part_ids = match pass {
            Pass::MinimumRemainder => stock_store::parts_with_floor(&mut tx).await?,
            Pass::ReconcileFreeOrders | Pass::TrimCurrentOrder => {
                stock_store::parts_in_basket(&mut tx, basket.id).await?
            }
        };
        let mut pools = stock_store::load_pools(&mut tx, &part_ids).await?;
        for pool in pools.iter_mut() {
            pool.register_basket(&basket);
        }

        let units = match pass {
            Pass::MinimumRemainder => engine::check_minimum_remainder(&mut pools, &basket),
            Pass::ReconcileFreeOrders => engine::reconcile_free_orders(&mut pools, &basket),
            Pass::TrimCurrentOrder => engine::trim_excess_current_order(&mut pools, &basket),
        };

        for pool in &pools {
            stock_store::apply_changes(&mut tx, &pool.changes()).await?;
        }
        tx.commit().await?;

        tracing::info!(pass = ?pass, parts = pools.len(), units, "Completed stock pass");

        Ok(BatchOutcome {
            parts: pools.len(),
            units,
        })
    }

    // ========================================================================
    // Order baskets
    // ========================================================================

    /// Close the current basket as one placed order per vendor and open a new one
    #[tracing::instrument(skip(self))]
    pub async fn place_order(&self, invoices: HashMap<Uuid, String>) -> AppResult<PlacedOrders> {
        let invoices = &invoices;
        retry_on_conflict(self.settings.conflict_retries, "Order", move || {
            self.place_order_once(invoices)
        })
        .await
    }

    async fn place_order_once(&self, invoices: &HashMap<Uuid, String>) -> AppResult<PlacedOrders> {
        let mut tx = self.db.begin().await?;
        let basket = stock_store::current_basket(&mut tx).await?;

        let lines = sqlx::query_as::<_, (Uuid, Option<Uuid>)>(
            r#"
            SELECT su.id, p.vendor_id
            FROM stock_units su
            JOIN parts p ON p.id = su.part_id
            WHERE su.order_id = $1 AND NOT su.arrived AND su.job_id IS NULL
            ORDER BY su.date, su.id
            FOR UPDATE OF su
            "#,
        )
        .bind(basket.id)
        .fetch_all(&mut *tx)
        .await?;

        if lines.is_empty() {
            return Err(AppError::Conflict {
                resource: "order".to_string(),
                message: "The current order has no lines to place".to_string(),
            });
        }

        let mut closed_orders = Vec::new();
        let groups = engine::split_by_vendor(lines, invoices);
        for (target, group) in placements(basket.id, groups) {
            let order: OrderBasket = match target {
                Placement::Reuse(order_id) => sqlx::query_as::<_, OrderRow>(
                    r#"
                    UPDATE orders
                    SET current = FALSE, vendor_id = $2, invoice_number = $3
                    WHERE id = $1
                    RETURNING id, current, date, vendor_id, invoice_number
                    "#,
                )
                .bind(order_id)
                .bind(group.vendor_id)
                .bind(&group.invoice_number)
                .fetch_one(&mut *tx)
                .await?
                .into(),
                Placement::Create => {
                    let order: OrderBasket = sqlx::query_as::<_, OrderRow>(
                        r#"
                        INSERT INTO orders (current, date, vendor_id, invoice_number)
                        VALUES (FALSE, $1, $2, $3)
                        RETURNING id, current, date, vendor_id, invoice_number
                        "#,
                    )
                    .bind(basket.date)
                    .bind(group.vendor_id)
                    .bind(&group.invoice_number)
                    .fetch_one(&mut *tx)
                    .await?
                    .into();

                    sqlx::query("UPDATE stock_units SET order_id = $1 WHERE id = ANY($2)")
                        .bind(order.id)
                        .bind(&group.unit_ids)
                        .execute(&mut *tx)
                        .await?;
                    order
                }
            };

            tracing::info!(
                order_id = %order.id,
                vendor_id = ?group.vendor_id,
                units = group.unit_ids.len(),
                "Placed order"
            );
            closed_orders.push(PlacedOrder {
                order,
                units: group.unit_ids.len(),
            });
        }

        let opened = stock_store::open_basket(&mut tx).await?;
        tx.commit().await?;

        Ok(PlacedOrders {
            closed_orders,
            opened,
        })
    }

    /// Attach or change the invoice number of a placed order
    #[tracing::instrument(skip(self))]
    pub async fn tag_invoice(&self, order_id: Uuid, invoice_number: String) -> AppResult<OrderBasket> {
        let mut tx = self.db.begin().await?;
        let order = stock_store::find_order(&mut tx, order_id).await?;
        if order.current {
            return Err(AppError::Conflict {
                resource: "order".to_string(),
                message: "The current order gets its invoice when it is placed".to_string(),
            });
        }

        let updated: OrderBasket = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders SET invoice_number = $2
            WHERE id = $1
            RETURNING id, current, date, vendor_id, invoice_number
            "#,
        )
        .bind(order_id)
        .bind(&invoice_number)
        .fetch_one(&mut *tx)
        .await?
        .into();
        tx.commit().await?;

        tracing::info!(order_id = %order_id, invoice_number = %invoice_number, "Tagged invoice");
        Ok(updated)
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Assign a prosthesis to a job; the price list must match the client's region
    #[tracing::instrument(skip(self))]
    pub async fn assign_prosthesis(
        &self,
        job_id: Uuid,
        prosthesis_id: Uuid,
    ) -> AppResult<JobProsthesis> {
        let mut tx = self.db.begin().await?;

        let client = sqlx::query_as::<_, RegionRow>(
            r#"
            SELECT c.region
            FROM jobs j
            JOIN clients c ON c.id = j.client_id
            WHERE j.id = $1
            FOR UPDATE OF j
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        let prosthesis = sqlx::query_as::<_, RegionRow>("SELECT region FROM prostheses WHERE id = $1")
            .bind(prosthesis_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Prosthesis".to_string()))?;

        let client_region = parse_region(&client.region)?;
        let prosthesis_region = parse_region(&prosthesis.region)?;
        validate_prosthesis_region(client_region, prosthesis_region).map_err(|message| {
            AppError::IntegrityViolation {
                field: "prosthesis_id".to_string(),
                message: message.to_string(),
            }
        })?;

        sqlx::query("UPDATE jobs SET prosthesis_id = $2 WHERE id = $1")
            .bind(job_id)
            .bind(prosthesis_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(JobProsthesis {
            job_id,
            prosthesis_id,
            region: client_region,
        })
    }

    // ========================================================================
    // Transaction plumbing
    // ========================================================================

    /// Begin a transaction holding the current basket and the part's stock
    async fn open_part(
        &self,
        part_id: Uuid,
    ) -> AppResult<(Transaction<'static, Postgres>, OrderBasketHandle, PartPool)> {
        let mut tx = self.db.begin().await?;
        let basket = stock_store::current_basket(&mut tx).await?.handle();
        let pool = stock_store::load_pool(&mut tx, part_id, LockMode::ForUpdate).await?;
        Ok((tx, basket, pool))
    }

    /// Settle, persist and commit a part mutation
    async fn finish<T>(
        &self,
        mut tx: Transaction<'static, Postgres>,
        basket: &OrderBasketHandle,
        mut pool: PartPool,
        outcome: T,
        log: Option<LogEntry>,
    ) -> AppResult<PartMutation<T>> {
        let consistency = if self.settings.consistency_passes {
            engine::run_consistency_passes(&mut pool, basket)
        } else {
            ConsistencyReport::default()
        };

        let changes = pool.changes();
        stock_store::apply_changes(&mut tx, &changes).await?;

        let log = match log {
            Some(entry) => {
                stock_store::write_log(
                    &mut tx,
                    entry.operation,
                    entry.job_id,
                    &entry.unit_ids,
                    entry.comment.as_deref(),
                )
                .await?
            }
            None => None,
        };

        tx.commit().await?;

        tracing::debug!(
            part_id = %pool.part_id(),
            changes = changes.len(),
            consistency = ?consistency,
            "Committed part mutation"
        );

        Ok(PartMutation {
            part_id: pool.part_id(),
            outcome,
            consistency,
            summary: pool.summary(basket),
            log,
        })
    }
}

/// Stock-wide passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    MinimumRemainder,
    ReconcileFreeOrders,
    TrimCurrentOrder,
}
