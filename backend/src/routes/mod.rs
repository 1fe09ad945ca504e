//! Route definitions for the clinic inventory server

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/inventory", inventory_routes())
}

/// Stock reservation routes
fn inventory_routes() -> Router<AppState> {
    use handlers::inventory as h;

    Router::new()
        // Per-part operations
        .route("/parts/:part_id/reserve", post(h::reserve))
        .route("/parts/:part_id/release", post(h::release))
        .route("/parts/:part_id/reorganize", post(h::reorganize))
        .route("/parts/:part_id/take", post(h::take))
        .route("/parts/:part_id/return", post(h::return_items))
        .route("/parts/:part_id/receive", post(h::receive))
        .route("/parts/:part_id/demand", put(h::set_job_demand))
        .route("/parts/:part_id/free-order", put(h::edit_free_order))
        .route("/parts/:part_id/summary", get(h::stock_summary))
        // Passes over all parts
        .route("/minimum-remainder", post(h::check_minimum_remainder))
        .route("/free-orders/reconcile", post(h::reconcile_free_orders))
        .route("/orders/current/trim", post(h::trim_excess_current_order))
        // Order baskets
        .route("/orders/current/place", post(h::place_order))
        .route("/orders/:order_id/invoice", put(h::tag_invoice))
        // Jobs
        .route("/jobs/:job_id/prosthesis", put(h::assign_prosthesis))
}
