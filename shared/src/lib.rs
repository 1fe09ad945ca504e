//! Shared types, models and the reservation engine for the clinic inventory
//!
//! Everything in this crate is free of I/O. The backend loads a part's stock
//! into a [`reservation::PartPool`], runs engine operations on it and writes
//! back the resulting [`reservation::ChangeSet`] in one transaction.

pub mod models;
pub mod reservation;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
