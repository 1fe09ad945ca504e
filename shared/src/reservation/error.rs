//! Engine precondition errors

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while assembling a part pool.
///
/// Allocation itself never fails: inconsistencies met during a pass are
/// skipped and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("Stock unit {unit_id} belongs to part {unit_part_id}, not {part_id}")]
    PartMismatch {
        unit_id: Uuid,
        unit_part_id: Uuid,
        part_id: Uuid,
    },

    #[error("Stock unit {0} was loaded twice")]
    DuplicateUnit(Uuid),
}
