//! Fixtures for engine unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::pool::PartPool;
use crate::models::{JobRef, OrderBasketHandle, PartModel, StockUnit};

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::days(n)
}

pub fn part(minimum_remainder: i32) -> PartModel {
    PartModel {
        id: Uuid::new_v4(),
        vendor_code: "1C30=L".to_string(),
        name: "Foot module".to_string(),
        units: Some("pcs".to_string()),
        price: Some(Decimal::from(1200)),
        manufacturer_id: None,
        vendor_id: None,
        note: None,
        minimum_remainder,
    }
}

pub fn job(n: i64) -> JobRef {
    JobRef::new(Uuid::new_v4(), day(n))
}

pub fn basket() -> OrderBasketHandle {
    OrderBasketHandle {
        id: Uuid::new_v4(),
        date: day(0),
    }
}

pub fn placed_basket(date: DateTime<Utc>) -> OrderBasketHandle {
    OrderBasketHandle {
        id: Uuid::new_v4(),
        date,
    }
}

pub fn arrived_unit(part: &PartModel, date: DateTime<Utc>) -> StockUnit {
    StockUnit::received(part.id, part.order_price(), false, date)
}

pub fn ordered_unit(part: &PartModel, basket: &OrderBasketHandle, date: DateTime<Utc>) -> StockUnit {
    StockUnit::ordered(part.id, basket.id, part.order_price(), date)
}

pub fn pool_of(part: PartModel, units: Vec<StockUnit>, basket: &OrderBasketHandle) -> PartPool {
    PartPool::new(part, units)
        .unwrap()
        .with_orders([(basket.id, basket.date)])
        .as_of(day(100))
}

pub fn reserved_ids(pool: &PartPool, job_id: Uuid) -> Vec<Uuid> {
    pool.units()
        .iter()
        .filter(|u| u.is_reservation() && u.reserved_id == Some(job_id))
        .map(|u| u.id)
        .collect()
}
