pub mod adapters;
pub mod bus;
pub mod config;
pub mod domain;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod ports;
pub mod services;
pub mod startup;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::bus::BusProducer;
use crate::ports::OrderRepository;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn OrderRepository>,
    pub producer: Arc<dyn BusProducer>,
    pub received_topic: String,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics::serve_metrics))
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::submit_order),
        )
        .route("/orders/:order_id", get(handlers::orders::get_order))
        .route(
            "/orders/:order_id/items",
            get(handlers::orders::get_order_items),
        )
        .with_state(state)
}
