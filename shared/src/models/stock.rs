//! Stock unit models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One physical, or still ordered, instance of a part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockUnit {
    pub id: Uuid,
    pub part_id: Uuid,
    /// Arrival date for received stock, creation date otherwise
    pub date: DateTime<Utc>,
    /// False while the unit is still on order
    pub arrived: bool,
    /// Alternate supplier tag
    pub vendor2: bool,
    /// Job that consumed the unit
    pub job_id: Option<Uuid>,
    /// Job the unit is earmarked for
    pub reserved_id: Option<Uuid>,
    /// Order basket the unit belongs to
    pub order_id: Option<Uuid>,
    pub price: Decimal,
    /// Manually added line, never trimmed automatically
    pub free_order: bool,
}

impl StockUnit {
    /// A new not-yet-arrived line in the given basket
    pub fn ordered(part_id: Uuid, order_id: Uuid, price: Decimal, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            part_id,
            date,
            arrived: false,
            vendor2: false,
            job_id: None,
            reserved_id: None,
            order_id: Some(order_id),
            price,
            free_order: false,
        }
    }

    /// A unit received outside of any order
    pub fn received(part_id: Uuid, price: Decimal, vendor2: bool, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            part_id,
            date,
            arrived: true,
            vendor2,
            job_id: None,
            reserved_id: None,
            order_id: None,
            price,
            free_order: false,
        }
    }

    pub fn reserved_for(mut self, job_id: Uuid) -> Self {
        self.reserved_id = Some(job_id);
        self
    }

    pub fn as_free_order(mut self) -> Self {
        self.free_order = true;
        self
    }

    /// Not consumed by any job
    pub fn is_unconsumed(&self) -> bool {
        self.job_id.is_none()
    }

    /// Neither consumed nor earmarked
    pub fn is_free(&self) -> bool {
        self.job_id.is_none() && self.reserved_id.is_none()
    }

    /// Earmarked for a job but not yet consumed
    pub fn is_reservation(&self) -> bool {
        self.job_id.is_none() && self.reserved_id.is_some()
    }

    /// Physically in the warehouse and not taken
    pub fn in_warehouse(&self) -> bool {
        self.arrived && self.job_id.is_none()
    }

    /// A not-yet-arrived line of the given basket
    pub fn is_open_line_of(&self, order_id: Uuid) -> bool {
        !self.arrived && self.job_id.is_none() && self.order_id == Some(order_id)
    }
}
