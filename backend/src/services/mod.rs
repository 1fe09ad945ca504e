//! Business logic services for the clinic inventory server

pub mod reservation;
pub mod retry;
pub mod stock_store;

pub use reservation::ReservationService;
