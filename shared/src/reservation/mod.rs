//! Part-level reservation engine
//!
//! All operations work on a [`PartPool`] and never touch storage. Callers load
//! the pool, run one or more operations, then persist [`PartPool::changes`].

mod error;

pub mod allocator;
pub mod basket;
pub mod demand;
pub mod minimum;
pub mod policy;
pub mod pool;
pub mod reconcile;
pub mod release;
pub mod reorganize;
pub mod warehouse;

#[cfg(test)]
pub(crate) mod testing;

pub use allocator::{reserve, ReserveOutcome};
pub use basket::{split_by_vendor, VendorGroup};
pub use demand::{edit_free_order, set_job_demand, DemandOutcome, FreeOrderOutcome};
pub use error::ReservationError;
pub use minimum::{check_minimum_remainder, top_up_minimum};
pub use pool::{ChangeSet, PartPool, PoolSummary};
pub use reconcile::{
    migrate_to_free_order, reconcile_free_orders, run_consistency_passes, trim_excess,
    trim_excess_current_order, ConsistencyReport,
};
pub use release::{release, ReleaseOutcome};
pub use reorganize::{reorganize, ReorganizeOutcome};
pub use warehouse::{
    receive, return_items, take, ReceiptLine, ReceiptOutcome, ReturnOutcome, TakeOutcome,
};
