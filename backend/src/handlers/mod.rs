//! HTTP handlers for the clinic inventory server

pub mod health;
pub mod inventory;

pub use health::health_check;
