//! Reorganization of a part's reservations
//!
//! After returns, receipts or manual edits a reservation can be pinned to a
//! worse unit than one now free. The pass detaches every unconsumed claim,
//! orders the claims by need-by date and deals them out again: arrived stock
//! first, then order lines. The earliest jobs always end up on arrived stock,
//! whatever order the returns happened in.

use serde::Serialize;
use uuid::Uuid;

use super::policy::{ClaimOrder, ReorganizeArrived, ReorganizeOrdered};
use super::pool::PartPool;

/// Result of a `reorganize` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReorganizeOutcome {
    /// Claims dealt out again
    pub claims: usize,
    /// Units whose reservation changed
    pub moved: usize,
}

/// Re-derive which units carry the part's reservations.
///
/// `focus` is the job whose action triggered the pass; it wins ties between
/// jobs with the same need-by date.
pub fn reorganize(pool: &mut PartPool, focus: Option<Uuid>) -> ReorganizeOutcome {
    let order = ClaimOrder { focus };

    let mut claims: Vec<(Uuid, Uuid)> = pool
        .units()
        .iter()
        .filter(|u| u.is_reservation())
        .filter_map(|u| u.reserved_id.map(|job| (u.id, job)))
        .collect();
    claims.sort_by_key(|(unit_id, job_id)| (order.key(*job_id, pool), *unit_id));

    let before: Vec<(Uuid, Option<Uuid>)> = pool
        .units()
        .iter()
        .map(|u| (u.id, u.reserved_id))
        .collect();

    for (unit_id, _) in &claims {
        pool.set_reserved(*unit_id, None);
    }

    let mut targets = pool.ranked(|u| u.arrived && u.is_free(), &ReorganizeArrived);
    targets.extend(pool.ranked(|u| !u.arrived && u.is_free(), &ReorganizeOrdered));

    for ((_, job_id), unit_id) in claims.iter().zip(targets) {
        pool.set_reserved(unit_id, Some(*job_id));
    }

    let moved = before
        .iter()
        .filter(|(id, reserved)| pool.unit(*id).map_or(false, |u| u.reserved_id != *reserved))
        .count();

    let outcome = ReorganizeOutcome {
        claims: claims.len(),
        moved,
    };

    tracing::info!(
        part_id = %pool.part_id(),
        focus = ?focus,
        claims = outcome.claims,
        moved = outcome.moved,
        "Reorganized reservations"
    );

    outcome
}
