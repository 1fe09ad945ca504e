//! Domain models for the clinic inventory

mod job;
mod log;
mod order;
mod part;
mod stock;

pub use job::*;
pub use log::*;
pub use order::*;
pub use part::*;
pub use stock::*;
