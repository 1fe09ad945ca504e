//! Job models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of a client job the allocator needs: identity and need-by date.
///
/// An earlier `date` is a higher priority claim on stock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobRef {
    pub id: Uuid,
    pub date: DateTime<Utc>,
}

impl JobRef {
    pub fn new(id: Uuid, date: DateTime<Utc>) -> Self {
        Self { id, date }
    }
}
