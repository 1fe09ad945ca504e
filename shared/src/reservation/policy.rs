//! Ordering policies for stock selection.
//!
//! Every selection the engine makes goes through one of these comparators.
//! Each policy maps a unit to a sort key; the smallest key is picked first.
//! The unit id closes every key so selections are deterministic.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::pool::PartPool;
use crate::models::StockUnit;

/// Sort key of a unit under a selection policy
pub trait UnitPriority {
    type Key: Ord;

    fn key(&self, unit: &StockUnit, pool: &PartPool) -> Self::Key;
}

/// Effective claim on a unit.
///
/// An unreserved line carries the implicit "now" claim and ranks after every
/// job date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Claim {
    Job(DateTime<Utc>),
    Unclaimed,
}

impl Claim {
    /// Claim held on a unit, `None` when the reserving job's date is unknown
    pub fn of(unit: &StockUnit, pool: &PartPool) -> Option<Claim> {
        match unit.reserved_id {
            None => Some(Claim::Unclaimed),
            Some(job_id) => pool.job_date(job_id).map(Claim::Job),
        }
    }
}

/// Orders sort oldest first; units outside any known order go last
fn order_rank(unit: &StockUnit, pool: &PartPool) -> (bool, Option<DateTime<Utc>>) {
    let date = pool.order_date(unit.order_id);
    (date.is_none(), date)
}

/// Free arrived stock: alternate-vendor units first, then oldest first
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrivalPriority;

impl UnitPriority for ArrivalPriority {
    type Key = (bool, DateTime<Utc>, Uuid);

    fn key(&self, unit: &StockUnit, _pool: &PartPool) -> Self::Key {
        (!unit.vendor2, unit.date, unit.id)
    }
}

/// Arrived stock reserved for other jobs: the latest need-by date gives first
#[derive(Debug, Clone, Copy, Default)]
pub struct BorrowPriority;

impl UnitPriority for BorrowPriority {
    type Key = (Reverse<Option<DateTime<Utc>>>, bool, DateTime<Utc>, Uuid);

    fn key(&self, unit: &StockUnit, pool: &PartPool) -> Self::Key {
        let claim = unit.reserved_id.and_then(|job| pool.job_date(job));
        (Reverse(claim), !unit.vendor2, unit.date, unit.id)
    }
}

/// Not-yet-arrived lines: oldest order first, then the weakest claim first
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderLinePriority;

impl UnitPriority for OrderLinePriority {
    type Key = (
        (bool, Option<DateTime<Utc>>),
        Reverse<Option<Claim>>,
        DateTime<Utc>,
        Uuid,
    );

    fn key(&self, unit: &StockUnit, pool: &PartPool) -> Self::Key {
        (
            order_rank(unit, pool),
            Reverse(Claim::of(unit, pool)),
            unit.date,
            unit.id,
        )
    }
}

/// Reservations to give up: current-order lines, then placed-order lines,
/// then arrived stock; alternate-vendor units first, newest first
#[derive(Debug, Clone, Copy)]
pub struct ReleasePriority {
    pub current_order: Uuid,
}

impl UnitPriority for ReleasePriority {
    type Key = (u8, bool, Reverse<DateTime<Utc>>, Uuid);

    fn key(&self, unit: &StockUnit, _pool: &PartPool) -> Self::Key {
        let tier = match (unit.arrived, unit.order_id == Some(self.current_order)) {
            (false, true) => 0,
            (false, false) => 1,
            (true, _) => 2,
        };
        (tier, !unit.vendor2, Reverse(unit.date), unit.id)
    }
}

/// Arrived stock during reorganization: alternate-vendor first, latest arrival first
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorganizeArrived;

impl UnitPriority for ReorganizeArrived {
    type Key = (bool, Reverse<DateTime<Utc>>, Uuid);

    fn key(&self, unit: &StockUnit, _pool: &PartPool) -> Self::Key {
        (!unit.vendor2, Reverse(unit.date), unit.id)
    }
}

/// Order lines during reorganization: oldest order first, free-order lines
/// before ordinary ones
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorganizeOrdered;

impl UnitPriority for ReorganizeOrdered {
    type Key = ((bool, Option<DateTime<Utc>>), bool, DateTime<Utc>, Uuid);

    fn key(&self, unit: &StockUnit, pool: &PartPool) -> Self::Key {
        (order_rank(unit, pool), !unit.free_order, unit.date, unit.id)
    }
}

/// Stock to hand out on take: the job's own reservations first
#[derive(Debug, Clone, Copy)]
pub struct TakePriority {
    pub job_id: Uuid,
}

impl UnitPriority for TakePriority {
    type Key = (bool, bool, DateTime<Utc>, Uuid);

    fn key(&self, unit: &StockUnit, _pool: &PartPool) -> Self::Key {
        (
            unit.reserved_id != Some(self.job_id),
            !unit.vendor2,
            unit.date,
            unit.id,
        )
    }
}

/// Consumed units to give back: most recently dated first
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnPriority;

impl UnitPriority for ReturnPriority {
    type Key = (Reverse<DateTime<Utc>>, Uuid);

    fn key(&self, unit: &StockUnit, _pool: &PartPool) -> Self::Key {
        (Reverse(unit.date), unit.id)
    }
}

/// Order lines matched by a shipment: the named order first, then placed
/// orders oldest first, then the current order
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPriority {
    pub order: Option<Uuid>,
    pub current_order: Uuid,
}

impl UnitPriority for ReceiptPriority {
    type Key = (u8, (bool, Option<DateTime<Utc>>), DateTime<Utc>, Uuid);

    fn key(&self, unit: &StockUnit, pool: &PartPool) -> Self::Key {
        let tier = if self.order.is_some() && unit.order_id == self.order {
            0
        } else if unit.order_id == Some(self.current_order) {
            2
        } else {
            1
        };
        (tier, order_rank(unit, pool), unit.date, unit.id)
    }
}

/// Speculative lines to trim: newest first
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimPriority;

impl UnitPriority for TrimPriority {
    type Key = (Reverse<DateTime<Utc>>, Uuid);

    fn key(&self, unit: &StockUnit, _pool: &PartPool) -> Self::Key {
        (Reverse(unit.date), unit.id)
    }
}

/// Reservation claims by need-by date, earliest first.
///
/// Equal dates favour the focus job; unknown dates go last.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimOrder {
    pub focus: Option<Uuid>,
}

impl ClaimOrder {
    pub fn key(&self, job_id: Uuid, pool: &PartPool) -> (bool, Option<DateTime<Utc>>, bool, Uuid) {
        let date = pool.job_date(job_id);
        (date.is_none(), date, self.focus != Some(job_id), job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::testing::*;

    #[test]
    fn test_unclaimed_ranks_after_any_job_date() {
        assert!(Claim::Job(day(10_000)) < Claim::Unclaimed);
        assert!(Claim::Job(day(1)) < Claim::Job(day(2)));
    }

    #[test]
    fn test_arrival_priority_prefers_vendor2_then_oldest() {
        let part = part(0);
        let basket = basket();
        let old = arrived_unit(&part, day(1));
        let newer = arrived_unit(&part, day(2));
        let mut alt = arrived_unit(&part, day(3));
        alt.vendor2 = true;
        let expected = vec![alt.id, old.id, newer.id];
        let pool = pool_of(part, vec![newer, old, alt], &basket);

        assert_eq!(pool.ranked(|u| u.arrived, &ArrivalPriority), expected);
    }

    #[test]
    fn test_borrow_priority_takes_latest_job_first() {
        let part = part(0);
        let basket = basket();
        let (early, late) = (job(1), job(9));
        let a = arrived_unit(&part, day(1)).reserved_for(early.id);
        let b = arrived_unit(&part, day(1)).reserved_for(late.id);
        let expected = vec![b.id, a.id];
        let pool = pool_of(part, vec![a, b], &basket).with_jobs([early, late]);

        assert_eq!(pool.ranked(|u| u.arrived, &BorrowPriority), expected);
    }

    #[test]
    fn test_order_line_priority_oldest_order_then_weakest_claim() {
        let part = part(0);
        let current = basket();
        let placed = placed_basket(day(-30));
        let claimant = job(5);
        let in_current = ordered_unit(&part, &current, day(1));
        let placed_claimed = ordered_unit(&part, &placed, day(1)).reserved_for(claimant.id);
        let placed_free = ordered_unit(&part, &placed, day(1));
        let expected = vec![placed_free.id, placed_claimed.id, in_current.id];
        let pool = pool_of(part, vec![in_current, placed_claimed, placed_free], &current)
            .with_jobs([claimant])
            .with_orders([(placed.id, placed.date)]);

        assert_eq!(pool.ranked(|u| !u.arrived, &OrderLinePriority), expected);
    }

    #[test]
    fn test_release_priority_tiers() {
        let part = part(0);
        let current = basket();
        let placed = placed_basket(day(-30));
        let arrived = arrived_unit(&part, day(1));
        let placed_line = ordered_unit(&part, &placed, day(1));
        let current_line = ordered_unit(&part, &current, day(1));
        let expected = vec![current_line.id, placed_line.id, arrived.id];
        let pool = pool_of(part, vec![arrived, placed_line, current_line], &current);

        let policy = ReleasePriority { current_order: current.id };
        assert_eq!(pool.ranked(|_| true, &policy), expected);
    }

    #[test]
    fn test_claim_order_breaks_ties_with_focus_job() {
        let part = part(0);
        let basket = basket();
        let (a, b) = (job(4), job(4));
        let pool = pool_of(part, vec![], &basket).with_jobs([a, b]);
        let order = ClaimOrder { focus: Some(b.id) };

        assert!(order.key(b.id, &pool) < order.key(a.id, &pool));
        assert!(order.key(a.id, &pool) < order.key(Uuid::new_v4(), &pool));
    }
}
