//! Part catalog models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog entry for an interchangeable component type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartModel {
    pub id: Uuid,
    /// Vendor article code, unique across the catalog
    pub vendor_code: String,
    pub name: String,
    pub units: Option<String>,
    /// Nominal price used for newly ordered units
    pub price: Option<Decimal>,
    pub manufacturer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub note: Option<String>,
    /// Floor of unreserved stock; zero disables the check
    pub minimum_remainder: i32,
}

impl PartModel {
    /// Minimum remainder as a unit count, `None` when disabled
    pub fn floor(&self) -> Option<usize> {
        if self.minimum_remainder > 0 {
            Some(self.minimum_remainder as usize)
        } else {
            None
        }
    }

    /// Price stamped on units created for this part
    pub fn order_price(&self) -> Decimal {
        crate::validation::normalize_price(self.price.unwrap_or(Decimal::ZERO))
    }
}

impl std::fmt::Display for PartModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.vendor_code, self.name)
    }
}
