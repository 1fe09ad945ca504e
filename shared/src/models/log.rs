//! Warehouse operation log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Warehouse operations recorded in the log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryOperation {
    Reception,
    Return,
    Take,
}

impl InventoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryOperation::Reception => "RECEPTION",
            InventoryOperation::Return => "RETURN",
            InventoryOperation::Take => "TAKE",
        }
    }
}

impl std::fmt::Display for InventoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logged warehouse operation and the units it touched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLog {
    pub id: Uuid,
    pub operation: InventoryOperation,
    pub job_id: Option<Uuid>,
    pub unit_ids: Vec<Uuid>,
    pub comment: Option<String>,
    pub date: DateTime<Utc>,
}
