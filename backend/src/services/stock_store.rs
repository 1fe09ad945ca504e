//! Persistence of stock pools
//!
//! Loads a part's stock into a [`PartPool`] under row locks and writes the
//! engine's [`ChangeSet`] back inside the caller's transaction.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{InventoryLog, InventoryOperation, JobRef, OrderBasket, PartModel, StockUnit};
use shared::reservation::{ChangeSet, PartPool};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Row for the parts query
#[derive(Debug, FromRow)]
struct PartRow {
    id: Uuid,
    vendor_code: String,
    name: String,
    units: Option<String>,
    price: Option<Decimal>,
    manufacturer_id: Option<Uuid>,
    vendor_id: Option<Uuid>,
    note: Option<String>,
    minimum_remainder: i32,
}

impl From<PartRow> for PartModel {
    fn from(row: PartRow) -> Self {
        PartModel {
            id: row.id,
            vendor_code: row.vendor_code,
            name: row.name,
            units: row.units,
            price: row.price,
            manufacturer_id: row.manufacturer_id,
            vendor_id: row.vendor_id,
            note: row.note,
            minimum_remainder: row.minimum_remainder,
        }
    }
}

/// Row for the stock_units query
#[derive(Debug, FromRow)]
struct StockUnitRow {
    id: Uuid,
    part_id: Uuid,
    date: DateTime<Utc>,
    arrived: bool,
    vendor2: bool,
    job_id: Option<Uuid>,
    reserved_id: Option<Uuid>,
    order_id: Option<Uuid>,
    price: Decimal,
    free_order: bool,
}

impl From<StockUnitRow> for StockUnit {
    fn from(row: StockUnitRow) -> Self {
        StockUnit {
            id: row.id,
            part_id: row.part_id,
            date: row.date,
            arrived: row.arrived,
            vendor2: row.vendor2,
            job_id: row.job_id,
            reserved_id: row.reserved_id,
            order_id: row.order_id,
            price: row.price,
            free_order: row.free_order,
        }
    }
}

/// Row for the orders query
#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    id: Uuid,
    current: bool,
    date: DateTime<Utc>,
    vendor_id: Option<Uuid>,
    invoice_number: Option<String>,
}

impl From<OrderRow> for OrderBasket {
    fn from(row: OrderRow) -> Self {
        OrderBasket {
            id: row.id,
            current: row.current,
            date: row.date,
            vendor_id: row.vendor_id,
            invoice_number: row.invoice_number,
        }
    }
}

/// Row for id/date lookups of jobs and orders
#[derive(Debug, FromRow)]
struct DatedRow {
    id: Uuid,
    date: DateTime<Utc>,
}

/// How a pool is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Lock the part and its units until the transaction ends
    ForUpdate,
    /// Plain read for display
    Snapshot,
}

const PART_COLUMNS: &str =
    "id, vendor_code, name, units, price, manufacturer_id, vendor_id, note, minimum_remainder";

const UNIT_COLUMNS: &str =
    "id, part_id, date, arrived, vendor2, job_id, reserved_id, order_id, price, free_order";

/// Lock and return the open basket, opening one if none exists.
///
/// A basket opened concurrently by another request wins; its row is then
/// locked and returned instead.
pub async fn current_basket(conn: &mut PgConnection) -> AppResult<OrderBasket> {
    if let Some(basket) = lock_current_basket(conn).await? {
        return Ok(basket);
    }

    let inserted = sqlx::query_as::<_, OrderRow>(
        r#"
        INSERT INTO orders (current, date)
        VALUES (TRUE, NOW())
        ON CONFLICT (current) WHERE current DO NOTHING
        RETURNING id, current, date, vendor_id, invoice_number
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        tracing::info!(order_id = %row.id, "Opened a new current order");
        return Ok(row.into());
    }

    lock_current_basket(conn)
        .await?
        .ok_or_else(|| AppError::ConcurrentMutationConflict("Order".to_string()))
}

async fn lock_current_basket(conn: &mut PgConnection) -> AppResult<Option<OrderBasket>> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT id, current, date, vendor_id, invoice_number
        FROM orders
        WHERE current
        FOR UPDATE
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(OrderBasket::from))
}

/// The open basket without locking it
pub async fn find_current_basket(conn: &mut PgConnection) -> AppResult<Option<OrderBasket>> {
    let row = sqlx::query_as::<_, OrderRow>(
        "SELECT id, current, date, vendor_id, invoice_number FROM orders WHERE current",
    )
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(OrderBasket::from))
}

/// Insert a fresh open basket
pub async fn open_basket(conn: &mut PgConnection) -> AppResult<OrderBasket> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        INSERT INTO orders (current, date)
        VALUES (TRUE, NOW())
        RETURNING id, current, date, vendor_id, invoice_number
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(order_id = %row.id, "Opened a new current order");
    Ok(row.into())
}

/// Lock an order row if it exists
pub async fn lookup_order(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Option<OrderBasket>> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT id, current, date, vendor_id, invoice_number
        FROM orders
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(OrderBasket::from))
}

pub async fn find_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<OrderBasket> {
    lookup_order(conn, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
}

pub async fn find_job(conn: &mut PgConnection, job_id: Uuid) -> AppResult<JobRef> {
    sqlx::query_as::<_, DatedRow>("SELECT id, date FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| JobRef::new(row.id, row.date))
        .ok_or_else(|| AppError::NotFound("Job".to_string()))
}

/// Load one part's stock with the dates the engine ranks by
pub async fn load_pool(
    conn: &mut PgConnection,
    part_id: Uuid,
    lock: LockMode,
) -> AppResult<PartPool> {
    let suffix = match lock {
        LockMode::ForUpdate => "FOR UPDATE",
        LockMode::Snapshot => "",
    };

    let part = sqlx::query_as::<_, PartRow>(&format!(
        "SELECT {} FROM parts WHERE id = $1 {}",
        PART_COLUMNS, suffix
    ))
    .bind(part_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Part".to_string()))?;

    let units: Vec<StockUnit> = sqlx::query_as::<_, StockUnitRow>(&format!(
        "SELECT {} FROM stock_units WHERE part_id = $1 ORDER BY date, id {}",
        UNIT_COLUMNS, suffix
    ))
    .bind(part_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(StockUnit::from)
    .collect();

    let job_ids: Vec<Uuid> = units
        .iter()
        .flat_map(|u| [u.reserved_id, u.job_id])
        .flatten()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let order_ids: Vec<Uuid> = units
        .iter()
        .filter_map(|u| u.order_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let jobs = sqlx::query_as::<_, DatedRow>("SELECT id, date FROM jobs WHERE id = ANY($1)")
        .bind(&job_ids)
        .fetch_all(&mut *conn)
        .await?;
    let orders = sqlx::query_as::<_, DatedRow>("SELECT id, date FROM orders WHERE id = ANY($1)")
        .bind(&order_ids)
        .fetch_all(&mut *conn)
        .await?;

    tracing::debug!(
        part_id = %part_id,
        units = units.len(),
        jobs = jobs.len(),
        orders = orders.len(),
        "Loaded stock pool"
    );

    let pool = PartPool::new(part.into(), units)?
        .with_jobs(jobs.into_iter().map(|row| JobRef::new(row.id, row.date)))
        .with_orders(orders.into_iter().map(|row| (row.id, row.date)));
    Ok(pool)
}

/// Lock and load several parts, in id order so concurrent batches queue up
pub async fn load_pools(conn: &mut PgConnection, part_ids: &[Uuid]) -> AppResult<Vec<PartPool>> {
    let mut sorted = part_ids.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut pools = Vec::with_capacity(sorted.len());
    for part_id in sorted {
        pools.push(load_pool(conn, part_id, LockMode::ForUpdate).await?);
    }
    Ok(pools)
}

/// Parts with a configured minimum remainder
pub async fn parts_with_floor(conn: &mut PgConnection) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM parts WHERE minimum_remainder > 0 ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Parts with open lines in the given basket
pub async fn parts_in_basket(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT DISTINCT part_id
        FROM stock_units
        WHERE order_id = $1 AND NOT arrived AND job_id IS NULL
        ORDER BY part_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Write an engine change set
pub async fn apply_changes(conn: &mut PgConnection, changes: &ChangeSet) -> AppResult<()> {
    if changes.is_empty() {
        return Ok(());
    }

    if !changes.deleted.is_empty() {
        sqlx::query("DELETE FROM stock_units WHERE id = ANY($1)")
            .bind(&changes.deleted)
            .execute(&mut *conn)
            .await?;
    }

    for unit in &changes.created {
        sqlx::query(
            r#"
            INSERT INTO stock_units (
                id, part_id, date, arrived, vendor2, job_id, reserved_id, order_id, price, free_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(unit.id)
        .bind(unit.part_id)
        .bind(unit.date)
        .bind(unit.arrived)
        .bind(unit.vendor2)
        .bind(unit.job_id)
        .bind(unit.reserved_id)
        .bind(unit.order_id)
        .bind(unit.price)
        .bind(unit.free_order)
        .execute(&mut *conn)
        .await?;
    }

    for unit in &changes.updated {
        sqlx::query(
            r#"
            UPDATE stock_units
            SET date = $2, arrived = $3, vendor2 = $4, job_id = $5, reserved_id = $6,
                order_id = $7, price = $8, free_order = $9
            WHERE id = $1
            "#,
        )
        .bind(unit.id)
        .bind(unit.date)
        .bind(unit.arrived)
        .bind(unit.vendor2)
        .bind(unit.job_id)
        .bind(unit.reserved_id)
        .bind(unit.order_id)
        .bind(unit.price)
        .bind(unit.free_order)
        .execute(&mut *conn)
        .await?;
    }

    tracing::debug!(
        created = changes.created.len(),
        updated = changes.updated.len(),
        deleted = changes.deleted.len(),
        "Applied stock changes"
    );

    Ok(())
}

/// Record a warehouse operation and the units it touched
pub async fn write_log(
    conn: &mut PgConnection,
    operation: InventoryOperation,
    job_id: Option<Uuid>,
    unit_ids: &[Uuid],
    comment: Option<&str>,
) -> AppResult<Option<InventoryLog>> {
    if unit_ids.is_empty() {
        return Ok(None);
    }

    let log_id = Uuid::new_v4();
    let date: DateTime<Utc> = sqlx::query_scalar(
        r#"
        INSERT INTO inventory_logs (id, operation, job_id, comment, date)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING date
        "#,
    )
    .bind(log_id)
    .bind(operation.as_str())
    .bind(job_id)
    .bind(comment)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_log_units (log_id, unit_id)
        SELECT $1, unit_id FROM UNNEST($2::uuid[]) AS unit_id
        "#,
    )
    .bind(log_id)
    .bind(unit_ids)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        log_id = %log_id,
        operation = %operation,
        units = unit_ids.len(),
        "Recorded warehouse operation"
    );

    Ok(Some(InventoryLog {
        id: log_id,
        operation,
        job_id,
        unit_ids: unit_ids.to_vec(),
        comment: comment.map(str::to_string),
        date,
    }))
}
