//! In-memory working set of one part's stock units

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ReservationError;
use super::policy::UnitPriority;
use crate::models::{JobRef, OrderBasketHandle, PartModel, StockUnit};

/// Stock of a single part loaded for one request.
///
/// Engine operations mutate the working set; [`PartPool::changes`] diffs it
/// against the snapshot taken at construction so the caller can persist the
/// result as one batch.
#[derive(Debug, Clone)]
pub struct PartPool {
    part: PartModel,
    units: Vec<StockUnit>,
    snapshot: BTreeMap<Uuid, StockUnit>,
    jobs: HashMap<Uuid, DateTime<Utc>>,
    orders: HashMap<Uuid, DateTime<Utc>>,
    as_of: DateTime<Utc>,
}

/// Rows to write back after engine operations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub created: Vec<StockUnit>,
    pub updated: Vec<StockUnit>,
    pub deleted: Vec<Uuid>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Unit counts of one part by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub part_id: Uuid,
    pub arrived_free: usize,
    pub arrived_reserved: usize,
    pub ordered_free: usize,
    pub ordered_reserved: usize,
    pub consumed: usize,
    pub free_order_lines: usize,
    pub minimum_remainder: i32,
}

impl PartPool {
    /// Build a pool from the part row and its stock units
    pub fn new(part: PartModel, units: Vec<StockUnit>) -> Result<Self, ReservationError> {
        let mut snapshot = BTreeMap::new();
        for unit in &units {
            if unit.part_id != part.id {
                return Err(ReservationError::PartMismatch {
                    unit_id: unit.id,
                    unit_part_id: unit.part_id,
                    part_id: part.id,
                });
            }
            if snapshot.insert(unit.id, unit.clone()).is_some() {
                return Err(ReservationError::DuplicateUnit(unit.id));
            }
        }

        Ok(Self {
            part,
            units,
            snapshot,
            jobs: HashMap::new(),
            orders: HashMap::new(),
            as_of: Utc::now(),
        })
    }

    /// Need-by dates of the jobs referenced by the units
    pub fn with_jobs(mut self, jobs: impl IntoIterator<Item = JobRef>) -> Self {
        for job in jobs {
            self.jobs.insert(job.id, job.date);
        }
        self
    }

    /// Dates of the order baskets referenced by the units
    pub fn with_orders(mut self, orders: impl IntoIterator<Item = (Uuid, DateTime<Utc>)>) -> Self {
        self.orders.extend(orders);
        self
    }

    /// Timestamp stamped on units created or received by this pool
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.as_of = now;
        self
    }

    pub fn register_job(&mut self, job: JobRef) {
        self.jobs.insert(job.id, job.date);
    }

    pub fn register_basket(&mut self, basket: &OrderBasketHandle) {
        self.orders.insert(basket.id, basket.date);
    }

    pub fn part(&self) -> &PartModel {
        &self.part
    }

    pub fn part_id(&self) -> Uuid {
        self.part.id
    }

    pub fn units(&self) -> &[StockUnit] {
        &self.units
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn unit(&self, id: Uuid) -> Option<&StockUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn job_date(&self, job_id: Uuid) -> Option<DateTime<Utc>> {
        self.jobs.get(&job_id).copied()
    }

    pub fn order_date(&self, order_id: Option<Uuid>) -> Option<DateTime<Utc>> {
        order_id.and_then(|id| self.orders.get(&id).copied())
    }

    /// Units earmarked for the job and not yet consumed
    pub fn reserved_count(&self, job_id: Uuid) -> usize {
        self.units
            .iter()
            .filter(|u| u.is_reservation() && u.reserved_id == Some(job_id))
            .count()
    }

    /// Units consumed by the job
    pub fn consumed_count(&self, job_id: Uuid) -> usize {
        self.units.iter().filter(|u| u.job_id == Some(job_id)).count()
    }

    /// Unreserved and unconsumed units, arrived or on order
    pub fn free_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_free()).count()
    }

    /// Arrived units not taken by a job
    pub fn quantity_total(&self) -> usize {
        self.units.iter().filter(|u| u.in_warehouse()).count()
    }

    /// Arrived units the job may take: free ones and its own reservations
    pub fn available_for(&self, job_id: Uuid) -> usize {
        self.units
            .iter()
            .filter(|u| u.in_warehouse() && u.reserved_id.map_or(true, |r| r == job_id))
            .count()
    }

    pub fn summary(&self, basket: &OrderBasketHandle) -> PoolSummary {
        let mut summary = PoolSummary {
            part_id: self.part.id,
            minimum_remainder: self.part.minimum_remainder,
            ..Default::default()
        };

        for unit in &self.units {
            match (unit.job_id.is_some(), unit.arrived, unit.reserved_id.is_some()) {
                (true, _, _) => summary.consumed += 1,
                (false, true, false) => summary.arrived_free += 1,
                (false, true, true) => summary.arrived_reserved += 1,
                (false, false, false) => summary.ordered_free += 1,
                (false, false, true) => summary.ordered_reserved += 1,
            }
            if unit.free_order && unit.is_open_line_of(basket.id) {
                summary.free_order_lines += 1;
            }
        }

        summary
    }

    /// Ids of the units passing `filter`, best first under `policy`
    pub fn ranked<P, F>(&self, filter: F, policy: &P) -> Vec<Uuid>
    where
        P: UnitPriority,
        F: Fn(&StockUnit) -> bool,
    {
        let mut keyed: Vec<(P::Key, Uuid)> = self
            .units
            .iter()
            .filter(|u| filter(u))
            .map(|u| (policy.key(u, self), u.id))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, id)| id).collect()
    }

    pub(crate) fn unit_mut(&mut self, id: Uuid) -> Option<&mut StockUnit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    /// Set the reservation of a unit, returning the previous holder
    pub(crate) fn set_reserved(&mut self, id: Uuid, job_id: Option<Uuid>) -> Option<Uuid> {
        match self.unit_mut(id) {
            Some(unit) => std::mem::replace(&mut unit.reserved_id, job_id),
            None => None,
        }
    }

    /// Append a new not-yet-arrived line to the basket
    pub(crate) fn push_ordered(
        &mut self,
        basket: &OrderBasketHandle,
        reserved_id: Option<Uuid>,
        free_order: bool,
    ) -> Uuid {
        let mut unit = StockUnit::ordered(self.part.id, basket.id, self.part.order_price(), self.as_of);
        unit.reserved_id = reserved_id;
        unit.free_order = free_order;
        let id = unit.id;
        self.units.push(unit);
        id
    }

    pub(crate) fn push(&mut self, unit: StockUnit) -> Uuid {
        let id = unit.id;
        self.units.push(unit);
        id
    }

    pub(crate) fn remove(&mut self, id: Uuid) -> Option<StockUnit> {
        let position = self.units.iter().position(|u| u.id == id)?;
        Some(self.units.remove(position))
    }

    /// Diff of the working set against the loaded snapshot
    pub fn changes(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut present = HashSet::with_capacity(self.units.len());

        for unit in &self.units {
            present.insert(unit.id);
            match self.snapshot.get(&unit.id) {
                None => changes.created.push(unit.clone()),
                Some(original) if original != unit => changes.updated.push(unit.clone()),
                Some(_) => {}
            }
        }

        changes.deleted = self
            .snapshot
            .keys()
            .filter(|id| !present.contains(id))
            .copied()
            .collect();

        changes
    }
}
