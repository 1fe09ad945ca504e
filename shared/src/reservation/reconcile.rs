//! Free-order reconciliation and current-order trimming

use serde::Serialize;
use uuid::Uuid;

use super::minimum::top_up_minimum;
use super::policy::{ClaimOrder, TrimPriority};
use super::pool::PartPool;
use crate::models::OrderBasketHandle;

/// Summary of the trailing consistency passes over one part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub migrated: usize,
    pub trimmed: usize,
    pub topped_up: usize,
}

impl ConsistencyReport {
    pub fn is_empty(&self) -> bool {
        self.migrated == 0 && self.trimmed == 0 && self.topped_up == 0
    }

    pub fn add(&mut self, other: &ConsistencyReport) {
        self.migrated += other.migrated;
        self.trimmed += other.trimmed;
        self.topped_up += other.topped_up;
    }
}

/// Move reservations from ordinary current-order lines onto free-order lines.
///
/// Each migrated claim deletes the ordinary line it came from.
pub fn migrate_to_free_order(pool: &mut PartPool, basket: &OrderBasketHandle) -> usize {
    let free_lines: Vec<Uuid> = pool
        .units()
        .iter()
        .filter(|u| u.free_order && u.is_free() && u.is_open_line_of(basket.id))
        .map(|u| u.id)
        .collect();
    if free_lines.is_empty() {
        return 0;
    }

    let order = ClaimOrder::default();
    let mut claimed: Vec<(Uuid, Uuid)> = pool
        .units()
        .iter()
        .filter(|u| !u.free_order && u.is_reservation() && u.is_open_line_of(basket.id))
        .filter_map(|u| u.reserved_id.map(|job| (u.id, job)))
        .collect();
    claimed.sort_by_key(|(unit_id, job_id)| (order.key(*job_id, pool), *unit_id));

    let mut migrated = 0;
    for (free_id, (ordinary_id, job_id)) in free_lines.into_iter().zip(claimed) {
        pool.set_reserved(free_id, Some(job_id));
        pool.remove(ordinary_id);
        migrated += 1;
    }

    if migrated > 0 {
        tracing::info!(
            part_id = %pool.part_id(),
            migrated,
            "Migrated reservations onto free-order lines"
        );
    }

    migrated
}

/// Run the migration over every part
pub fn reconcile_free_orders(pools: &mut [PartPool], basket: &OrderBasketHandle) -> usize {
    pools
        .iter_mut()
        .map(|pool| migrate_to_free_order(pool, basket))
        .sum()
}

/// Delete speculative current-order lines that free stock above the floor
/// no longer needs
pub fn trim_excess(pool: &mut PartPool, basket: &OrderBasketHandle) -> usize {
    let floor = pool.part().floor().unwrap_or(0);
    let excess = pool.free_count().saturating_sub(floor);
    if excess == 0 {
        return 0;
    }

    let candidates = pool.ranked(
        |u| u.is_free() && !u.free_order && u.is_open_line_of(basket.id),
        &TrimPriority,
    );

    let mut deleted = 0;
    for id in candidates.into_iter().take(excess) {
        pool.remove(id);
        deleted += 1;
    }

    if deleted > 0 {
        tracing::info!(
            part_id = %pool.part_id(),
            floor,
            deleted,
            "Trimmed excess from the current order"
        );
    }

    deleted
}

/// Run the trim over every part
pub fn trim_excess_current_order(pools: &mut [PartPool], basket: &OrderBasketHandle) -> usize {
    pools.iter_mut().map(|pool| trim_excess(pool, basket)).sum()
}

/// Migrate, trim, then top up, in that order, for one part
pub fn run_consistency_passes(pool: &mut PartPool, basket: &OrderBasketHandle) -> ConsistencyReport {
    let migrated = migrate_to_free_order(pool, basket);
    let trimmed = trim_excess(pool, basket);
    let topped_up = top_up_minimum(pool, basket);
    ConsistencyReport {
        migrated,
        trimmed,
        topped_up,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::testing::*;

    #[test]
    fn test_migrate_moves_claim_and_deletes_ordinary_line() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let ordinary = ordered_unit(&part, &basket, day(0)).reserved_for(j.id);
        let free_line = ordered_unit(&part, &basket, day(0)).as_free_order();
        let (ordinary_id, free_id) = (ordinary.id, free_line.id);
        let mut pool = pool_of(part, vec![ordinary, free_line], &basket).with_jobs([j]);

        assert_eq!(migrate_to_free_order(&mut pool, &basket), 1);
        assert_eq!(reserved_ids(&pool, j.id), vec![free_id]);
        assert!(pool.unit(ordinary_id).is_none());
    }

    #[test]
    fn test_migrate_serves_earliest_job_first() {
        let part = part(0);
        let basket = basket();
        let (early, late) = (job(1), job(8));
        let units = vec![
            ordered_unit(&part, &basket, day(0)).reserved_for(late.id),
            ordered_unit(&part, &basket, day(0)).reserved_for(early.id),
            ordered_unit(&part, &basket, day(0)).as_free_order(),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([early, late]);

        assert_eq!(migrate_to_free_order(&mut pool, &basket), 1);
        let early_unit = pool
            .units()
            .iter()
            .find(|u| u.reserved_id == Some(early.id))
            .unwrap();
        assert!(early_unit.free_order);
        let late_unit = pool
            .units()
            .iter()
            .find(|u| u.reserved_id == Some(late.id))
            .unwrap();
        assert!(!late_unit.free_order);
    }

    #[test]
    fn test_migrate_ignores_placed_orders() {
        let part = part(0);
        let current = basket();
        let placed = placed_basket(day(-5));
        let j = job(1);
        let units = vec![
            ordered_unit(&part, &placed, day(-5)).reserved_for(j.id),
            ordered_unit(&part, &current, day(0)).as_free_order(),
        ];
        let mut pool = pool_of(part, units, &current).with_jobs([j]);

        assert_eq!(migrate_to_free_order(&mut pool, &current), 0);
    }

    #[test]
    fn test_trim_keeps_floor_and_free_order_lines() {
        let part = part(2);
        let basket = basket();
        let units = vec![
            arrived_unit(&part, day(1)),
            ordered_unit(&part, &basket, day(0)),
            ordered_unit(&part, &basket, day(0)),
            ordered_unit(&part, &basket, day(0)).as_free_order(),
        ];
        let mut pool = pool_of(part, units, &basket);

        // 4 free, floor 2, but only the two ordinary lines may go
        assert_eq!(trim_excess(&mut pool, &basket), 2);
        assert_eq!(pool.free_count(), 2);
        assert!(pool.units().iter().any(|u| u.free_order));
        assert!(pool.units().iter().any(|u| u.arrived));
    }

    #[test]
    fn test_trim_without_floor_removes_all_speculative_lines() {
        let part = part(0);
        let basket = basket();
        let j = job(1);
        let units = vec![
            ordered_unit(&part, &basket, day(0)),
            ordered_unit(&part, &basket, day(0)).reserved_for(j.id),
        ];
        let mut pool = pool_of(part, units, &basket).with_jobs([j]);

        assert_eq!(trim_excess(&mut pool, &basket), 1);
        assert_eq!(pool.reserved_count(j.id), 1);
        assert_eq!(pool.units().len(), 1);
    }

    #[test]
    fn test_consistency_passes_settle() {
        let part = part(3);
        let basket = basket();
        let unit = arrived_unit(&part, day(1));
        let mut pool = pool_of(part, vec![unit], &basket);
        let first = run_consistency_passes(&mut pool, &basket);
        let second = run_consistency_passes(&mut pool, &basket);

        assert_eq!(first.topped_up, 2);
        assert!(second.is_empty());
    }
}
