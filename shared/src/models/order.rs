//! Order basket models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A batch of not-yet-received stock units grouped by vendor and time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBasket {
    pub id: Uuid,
    /// Exactly one basket is current at any time
    pub current: bool,
    pub date: DateTime<Utc>,
    pub vendor_id: Option<Uuid>,
    pub invoice_number: Option<String>,
}

impl OrderBasket {
    pub fn handle(&self) -> OrderBasketHandle {
        OrderBasketHandle {
            id: self.id,
            date: self.date,
        }
    }

    pub fn status(&self) -> &'static str {
        if self.current {
            "current"
        } else {
            "placed"
        }
    }
}

impl std::fmt::Display for OrderBasket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Order {} ({})", self.id, self.status())
    }
}

/// Reference to the open basket, passed explicitly to every allocation call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBasketHandle {
    pub id: Uuid,
    pub date: DateTime<Utc>,
}
