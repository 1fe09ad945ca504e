//! Reservation release

use serde::Serialize;
use uuid::Uuid;

use super::policy::ReleasePriority;
use super::pool::PartPool;
use crate::models::OrderBasketHandle;

/// Result of a `release` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseOutcome {
    /// Units no longer reserved for the job; never more than it held
    pub released: usize,
    /// Speculative current-order lines deleted outright
    pub deleted: usize,
    /// Units returned to the shared pool
    pub unreserved: usize,
}

/// Free up to `quantity` of the job's unconsumed reservations.
///
/// Ordinary lines of the open basket are cancelled; everything else goes back
/// to the shared pool.
pub fn release(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    job_id: Uuid,
    quantity: usize,
) -> ReleaseOutcome {
    let mut outcome = ReleaseOutcome::default();
    if quantity == 0 {
        return outcome;
    }

    let policy = ReleasePriority {
        current_order: basket.id,
    };
    let held = pool.ranked(
        |u| u.is_reservation() && u.reserved_id == Some(job_id),
        &policy,
    );
    if held.len() < quantity {
        tracing::debug!(
            part_id = %pool.part_id(),
            job_id = %job_id,
            requested = quantity,
            held = held.len(),
            "Release clamped to held reservations"
        );
    }

    for id in held.into_iter().take(quantity) {
        let cancel = pool
            .unit(id)
            .map_or(false, |u| !u.free_order && u.is_open_line_of(basket.id));
        if cancel {
            pool.remove(id);
            outcome.deleted += 1;
        } else {
            pool.set_reserved(id, None);
            outcome.unreserved += 1;
        }
        outcome.released += 1;
    }

    tracing::info!(
        part_id = %pool.part_id(),
        job_id = %job_id,
        released = outcome.released,
        deleted = outcome.deleted,
        "Released reservations"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::testing::*;

    #[test]
    fn test_release_cancels_current_order_lines() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let units = vec![
            ordered_unit(&part, &basket, day(0)).reserved_for(j.id),
            ordered_unit(&part, &basket, day(0)).reserved_for(j.id),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([j]);

        let outcome = release(&mut pool, &basket, j.id, 2);

        assert_eq!(outcome.released, 2);
        assert_eq!(outcome.deleted, 2);
        assert!(pool.units().is_empty());
    }

    #[test]
    fn test_release_keeps_free_order_and_arrived_units() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let units = vec![
            arrived_unit(&part, day(1)).reserved_for(j.id),
            ordered_unit(&part, &basket, day(0)).reserved_for(j.id).as_free_order(),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([j]);

        let outcome = release(&mut pool, &basket, j.id, 5);

        assert_eq!(outcome.released, 2);
        assert_eq!(outcome.unreserved, 2);
        assert_eq!(pool.units().len(), 2);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_release_prefers_current_order_over_arrived() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let arrived = arrived_unit(&part, day(1)).reserved_for(j.id);
        let arrived_id = arrived.id;
        let units = vec![arrived, ordered_unit(&part, &basket, day(0)).reserved_for(j.id)];
        let mut pool = pool_of(part, units, &basket).with_jobs([j]);

        let outcome = release(&mut pool, &basket, j.id, 1);

        assert_eq!(outcome.deleted, 1);
        assert_eq!(reserved_ids(&pool, j.id), vec![arrived_id]);
    }

    #[test]
    fn test_release_ignores_consumed_and_foreign_units() {
        let part = part(0);
        let basket = basket();
        let (j, other) = (job(1), job(2));
        let mut taken = arrived_unit(&part, day(1)).reserved_for(j.id);
        taken.job_id = Some(j.id);
        let units = vec![taken, arrived_unit(&part, day(1)).reserved_for(other.id)];
        let mut pool = pool_of(part, units, &basket).with_jobs([j, other]);

        let outcome = release(&mut pool, &basket, j.id, 3);

        assert_eq!(outcome.released, 0);
        assert_eq!(pool.consumed_count(j.id), 1);
        assert_eq!(pool.reserved_count(other.id), 1);
    }
}
