//! Target-count edits: per-job demand and free-order lines

use serde::Serialize;
use uuid::Uuid;

use super::allocator::{reserve, ReserveOutcome};
use super::policy::TrimPriority;
use super::pool::PartPool;
use super::release::{release, ReleaseOutcome};
use crate::models::{JobRef, OrderBasketHandle};

/// Result of bringing a job's reservation count to a target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DemandOutcome {
    pub previous: usize,
    pub reserved: ReserveOutcome,
    pub released: ReleaseOutcome,
}

/// Result of resizing the free-order lines of a part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FreeOrderOutcome {
    pub previous: usize,
    pub created: usize,
    pub deleted: usize,
    /// Reserved free-order lines turned into ordinary lines
    pub converted: usize,
}

/// Reserve or release the difference between the job's current reservations
/// and `desired`
pub fn set_job_demand(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    job: JobRef,
    desired: usize,
) -> DemandOutcome {
    pool.register_job(job);
    let previous = pool.reserved_count(job.id);
    let mut outcome = DemandOutcome {
        previous,
        ..Default::default()
    };

    if desired > previous {
        outcome.reserved = reserve(pool, basket, job, desired - previous);
    } else if desired < previous {
        outcome.released = release(pool, basket, job.id, previous - desired);
    }

    outcome
}

fn free_order_lines(pool: &PartPool, basket: &OrderBasketHandle) -> Vec<Uuid> {
    pool.units()
        .iter()
        .filter(|u| u.free_order && u.is_open_line_of(basket.id))
        .map(|u| u.id)
        .collect()
}

/// Set the number of free-order lines of the part in the current basket.
///
/// Shrinking deletes unreserved lines first; reserved lines keep their claim
/// and become ordinary lines.
pub fn edit_free_order(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    desired: usize,
) -> FreeOrderOutcome {
    let previous = free_order_lines(pool, basket).len();
    let mut outcome = FreeOrderOutcome {
        previous,
        ..Default::default()
    };

    if desired > previous {
        pool.register_basket(basket);
        for _ in previous..desired {
            pool.push_ordered(basket, None, true);
        }
        outcome.created = desired - previous;
    } else if desired < previous {
        let mut surplus = previous - desired;

        let unreserved = pool.ranked(
            |u| u.free_order && u.is_free() && u.is_open_line_of(basket.id),
            &TrimPriority,
        );
        for id in unreserved.into_iter().take(surplus) {
            pool.remove(id);
            outcome.deleted += 1;
        }
        surplus -= outcome.deleted;

        let reserved = pool.ranked(
            |u| u.free_order && u.reserved_id.is_some() && u.is_open_line_of(basket.id),
            &TrimPriority,
        );
        for id in reserved.into_iter().take(surplus) {
            if let Some(unit) = pool.unit_mut(id) {
                unit.free_order = false;
                outcome.converted += 1;
            }
        }
    }

    tracing::info!(
        part_id = %pool.part_id(),
        previous,
        desired,
        created = outcome.created,
        deleted = outcome.deleted,
        converted = outcome.converted,
        "Edited free order"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::testing::*;

    #[test]
    fn test_set_job_demand_grows_and_shrinks() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let units = vec![arrived_unit(&part, day(1)), arrived_unit(&part, day(1))];
        let mut pool = pool_of(part, units, &basket);

        let grown = set_job_demand(&mut pool, &basket, j, 3);
        assert_eq!(grown.previous, 0);
        assert_eq!(grown.reserved.from_stock, 2);
        assert_eq!(grown.reserved.created, 1);
        assert_eq!(pool.reserved_count(j.id), 3);

        let shrunk = set_job_demand(&mut pool, &basket, j, 1);
        assert_eq!(shrunk.previous, 3);
        assert_eq!(shrunk.released.released, 2);
        // The created line is cancelled before arrived stock is given up
        assert_eq!(shrunk.released.deleted, 1);
        assert_eq!(pool.reserved_count(j.id), 1);
    }

    #[test]
    fn test_set_job_demand_unchanged_is_a_no_op() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let units = vec![arrived_unit(&part, day(1)).reserved_for(j.id)];
        let mut pool = pool_of(part, units, &basket).with_jobs([j]);

        let outcome = set_job_demand(&mut pool, &basket, j, 1);

        assert_eq!(outcome.reserved, ReserveOutcome::default());
        assert_eq!(outcome.released, ReleaseOutcome::default());
        assert!(pool.changes().is_empty());
    }

    #[test]
    fn test_edit_free_order_creates_lines() {
        let part = part(0);
        let basket = basket();
        let mut pool = pool_of(part, vec![], &basket);

        let outcome = edit_free_order(&mut pool, &basket, 3);

        assert_eq!(outcome.created, 3);
        assert_eq!(pool.summary(&basket).free_order_lines, 3);
        assert!(pool.units().iter().all(|u| u.price == pool.part().order_price()));
    }

    #[test]
    fn test_edit_free_order_shrinks_unreserved_before_converting() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let held = ordered_unit(&part, &basket, day(0)).reserved_for(j.id).as_free_order();
        let held_id = held.id;
        let units = vec![
            held,
            ordered_unit(&part, &basket, day(0)).as_free_order(),
            ordered_unit(&part, &basket, day(0)).as_free_order(),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([j]);

        let outcome = edit_free_order(&mut pool, &basket, 0);

        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.converted, 1);
        let kept = pool.unit(held_id).unwrap();
        assert!(!kept.free_order);
        assert_eq!(kept.reserved_id, Some(j.id));
    }
}
