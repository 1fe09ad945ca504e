//! Reservation allocator
//!
//! `reserve` earmarks additional units of a part for a job. Slack is used
//! before new demand is created:
//!
//! 1. free arrived stock, alternate-vendor units first;
//! 2. arrived stock reserved for jobs needed strictly later, latest first;
//! 3. order lines whose effective claim is later than the job, oldest order first;
//! 4. new lines in the current basket for the shortfall, plus one line per
//!    unit borrowed in steps 2 and 3.
//!
//! Every job that lost a unit is queued and served the same way, earliest
//! need-by date first. A job only ever displaces strictly later jobs, so the
//! queue drains in non-decreasing date order and visits each job at most once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::policy::{ArrivalPriority, BorrowPriority, Claim, OrderLinePriority};
use super::pool::PartPool;
use crate::models::{JobRef, OrderBasketHandle};

/// Result of a `reserve` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReserveOutcome {
    /// New units had to be added to the current order
    pub ordered_more: bool,
    /// Units taken from free arrived stock
    pub from_stock: usize,
    /// Unreserved order lines claimed
    pub from_orders: usize,
    /// Units moved over from other jobs' reservations
    pub borrowed: usize,
    /// Units created in the current order
    pub created: usize,
    /// Displaced jobs served by the cascade
    pub cascaded_jobs: usize,
}

impl ReserveOutcome {
    fn absorb(&mut self, step: &AllocationStep) {
        self.from_stock += step.from_stock;
        self.from_orders += step.from_orders;
        self.borrowed += step.borrowed;
        self.created += step.created;
        self.ordered_more = self.created > 0;
    }
}

/// Outstanding demand keyed by need-by date, earliest first
#[derive(Debug, Default)]
struct DemandQueue {
    owed: BTreeMap<(DateTime<Utc>, Uuid), usize>,
}

impl DemandQueue {
    fn push(&mut self, job: JobRef, quantity: usize) {
        *self.owed.entry((job.date, job.id)).or_insert(0) += quantity;
    }

    fn pop(&mut self) -> Option<(JobRef, usize)> {
        self.owed
            .pop_first()
            .map(|((date, id), quantity)| (JobRef::new(id, date), quantity))
    }
}

/// What one pass over the pool did for a single job
#[derive(Debug, Default)]
struct AllocationStep {
    from_stock: usize,
    from_orders: usize,
    borrowed: usize,
    created: usize,
    displaced: Vec<Uuid>,
}

/// Ensure `quantity` more units of the pool's part are reserved for `job`
pub fn reserve(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    job: JobRef,
    quantity: usize,
) -> ReserveOutcome {
    let mut outcome = ReserveOutcome::default();
    if quantity == 0 {
        return outcome;
    }

    pool.register_job(job);
    pool.register_basket(basket);

    let mut queue = DemandQueue::default();
    queue.push(job, quantity);

    while let Some((claimant, owed)) = queue.pop() {
        let step = allocate(pool, basket, claimant, owed);
        outcome.absorb(&step);
        if claimant.id != job.id {
            outcome.cascaded_jobs += 1;
        }

        for displaced in step.displaced {
            match pool.job_date(displaced) {
                Some(date) => queue.push(JobRef::new(displaced, date), 1),
                None => tracing::warn!(
                    part_id = %pool.part_id(),
                    job_id = %displaced,
                    "Skipping displaced job without a known date"
                ),
            }
        }
    }

    tracing::info!(
        part_id = %pool.part_id(),
        job_id = %job.id,
        quantity,
        from_stock = outcome.from_stock,
        from_orders = outcome.from_orders,
        borrowed = outcome.borrowed,
        created = outcome.created,
        cascaded_jobs = outcome.cascaded_jobs,
        "Reserved stock"
    );

    outcome
}

fn allocate(
    pool: &mut PartPool,
    basket: &OrderBasketHandle,
    job: JobRef,
    quantity: usize,
) -> AllocationStep {
    let mut step = AllocationStep::default();
    let mut remaining = quantity;
    let claim = Claim::Job(job.date);

    // 1. Free arrived stock
    let free = pool.ranked(|u| u.arrived && u.is_free(), &ArrivalPriority);
    for id in free.into_iter().take(remaining) {
        pool.set_reserved(id, Some(job.id));
        step.from_stock += 1;
    }
    remaining -= step.from_stock;

    // 2. Arrived stock of later jobs
    if remaining > 0 {
        let later = pool.ranked(
            |u| {
                u.arrived
                    && u.is_reservation()
                    && u.reserved_id != Some(job.id)
                    && matches!(Claim::of(u, pool), Some(c) if c > claim)
            },
            &BorrowPriority,
        );
        for id in later.into_iter().take(remaining) {
            if let Some(previous) = pool.set_reserved(id, Some(job.id)) {
                step.displaced.push(previous);
            }
            step.borrowed += 1;
            remaining -= 1;
        }
    }

    // 3. Order lines with a weaker claim
    if remaining > 0 {
        let lines = pool.ranked(
            |u| {
                !u.arrived
                    && u.is_unconsumed()
                    && u.reserved_id != Some(job.id)
                    && matches!(Claim::of(u, pool), Some(c) if c > claim)
            },
            &OrderLinePriority,
        );
        for id in lines.into_iter().take(remaining) {
            match pool.set_reserved(id, Some(job.id)) {
                Some(previous) => {
                    step.displaced.push(previous);
                    step.borrowed += 1;
                }
                None => step.from_orders += 1,
            }
            remaining -= 1;
        }
    }

    // 4. Order the shortfall, and a replacement for every displaced claim
    for _ in 0..remaining {
        pool.push_ordered(basket, Some(job.id), false);
    }
    for _ in 0..step.displaced.len() {
        pool.push_ordered(basket, None, false);
    }
    step.created = remaining + step.displaced.len();

    tracing::debug!(
        part_id = %pool.part_id(),
        job_id = %job.id,
        quantity,
        from_stock = step.from_stock,
        from_orders = step.from_orders,
        borrowed = step.borrowed,
        created = step.created,
        displaced = step.displaced.len(),
        "Allocation pass"
    );

    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::testing::*;

    #[test]
    fn test_reserve_zero_is_noop() {
        let part = part(0);
        let basket = basket();
        let mut pool = pool_of(part, vec![], &basket);
        let outcome = reserve(&mut pool, &basket, job(1), 0);
        assert_eq!(outcome, ReserveOutcome::default());
        assert!(pool.changes().is_empty());
    }

    #[test]
    fn test_reserve_prefers_vendor2_stock() {
        let part = part(0);
        let basket = basket();
        let plain = arrived_unit(&part, day(1));
        let mut alt = arrived_unit(&part, day(5));
        alt.vendor2 = true;
        let alt_id = alt.id;
        let mut pool = pool_of(part, vec![plain, alt], &basket);
        let j = job(1);

        let outcome = reserve(&mut pool, &basket, j, 1);

        assert!(!outcome.ordered_more);
        assert_eq!(reserved_ids(&pool, j.id), vec![alt_id]);
    }

    #[test]
    fn test_reserve_borrows_from_later_job_and_cascades() {
        let part = part(0);
        let basket = basket();
        let (early, late) = (job(1), job(9));
        let units = vec![
            arrived_unit(&part, day(1)).reserved_for(late.id),
            arrived_unit(&part, day(1)).reserved_for(late.id),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([late]);

        let outcome = reserve(&mut pool, &basket, early, 2);

        assert_eq!(outcome.borrowed, 2);
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.from_orders, 2);
        assert_eq!(outcome.cascaded_jobs, 1);
        assert!(outcome.ordered_more);

        // The early job holds the arrived stock, the late one the new lines
        assert_eq!(pool.reserved_count(early.id), 2);
        assert_eq!(pool.reserved_count(late.id), 2);
        for unit in pool.units().iter().filter(|u| u.reserved_id == Some(early.id)) {
            assert!(unit.arrived);
        }
        for unit in pool.units().iter().filter(|u| u.reserved_id == Some(late.id)) {
            assert!(!unit.arrived);
            assert_eq!(unit.order_id, Some(basket.id));
        }
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_reserve_never_borrows_from_earlier_job() {
        let part = part(0);
        let basket = basket();
        let (early, late) = (job(1), job(9));
        let units = vec![
            arrived_unit(&part, day(1)).reserved_for(early.id),
            arrived_unit(&part, day(1)).reserved_for(early.id),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([early]);

        let outcome = reserve(&mut pool, &basket, late, 2);

        assert_eq!(outcome.borrowed, 0);
        assert_eq!(outcome.created, 2);
        assert_eq!(pool.reserved_count(early.id), 2);
        assert_eq!(pool.reserved_count(late.id), 2);
    }

    #[test]
    fn test_reserve_never_borrows_from_same_date_job() {
        let part = part(0);
        let basket = basket();
        let (a, b) = (job(3), job(3));
        let units = vec![arrived_unit(&part, day(1)).reserved_for(a.id)];
        let mut pool = pool_of(part, units, &basket).with_jobs([a]);

        let outcome = reserve(&mut pool, &basket, b, 1);

        assert_eq!(outcome.borrowed, 0);
        assert_eq!(pool.reserved_count(a.id), 1);
    }

    #[test]
    fn test_reserve_claims_unreserved_order_lines_before_ordering() {
        let part = part(0);
        let current = basket();
        let placed = placed_basket(day(-20));
        let older_line = ordered_unit(&part, &placed, day(-20));
        let older_id = older_line.id;
        let units = vec![ordered_unit(&part, &current, day(0)), older_line];
        let mut pool = pool_of(part, units, &current).with_orders([(placed.id, placed.date)]);
        let j = job(1);

        let outcome = reserve(&mut pool, &current, j, 1);

        assert!(!outcome.ordered_more);
        assert_eq!(outcome.from_orders, 1);
        assert_eq!(outcome.borrowed, 0);
        assert_eq!(reserved_ids(&pool, j.id), vec![older_id]);
    }

    #[test]
    fn test_cascade_runs_down_a_chain_of_jobs() {
        let part = part(0);
        let basket = basket();
        let (first, second, third) = (job(1), job(2), job(3));
        let units = vec![
            arrived_unit(&part, day(1)).reserved_for(second.id),
            arrived_unit(&part, day(1)).reserved_for(third.id),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([second, third]);

        let outcome = reserve(&mut pool, &basket, first, 1);

        // first takes from third (latest), third then takes a fresh line
        assert_eq!(outcome.cascaded_jobs, 1);
        assert_eq!(pool.reserved_count(first.id), 1);
        assert_eq!(pool.reserved_count(second.id), 1);
        assert_eq!(pool.reserved_count(third.id), 1);
        let second_unit = pool
            .units()
            .iter()
            .find(|u| u.reserved_id == Some(second.id))
            .unwrap();
        assert!(second_unit.arrived);
    }
}
