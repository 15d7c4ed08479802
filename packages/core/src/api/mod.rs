//! HTTP command/query API.
//!
//! Routes:
//! - `GET    /health`
//! - `GET    /metrics`
//! - `GET    /fares/lowest`
//! - `GET    /fares?limit=&max_price=`
//! - `GET    /fares/stats`
//! - `PUT    /subscriptions/:id`
//! - `GET    /subscriptions/:id`
//! - `DELETE /subscriptions/:id`

pub mod fares;
pub mod headers;
pub mod health;
pub mod subscriptions;

use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};

use crate::engine::AlertEngine;
use crate::metrics::AppMetrics;

/// Shared state for every route.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AlertEngine>,
    pub metrics: Arc<AppMetrics>,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/fares", get(fares::list_fares))
        .route("/fares/lowest", get(fares::lowest_fare))
        .route("/fares/stats", get(fares::fare_stats))
        .route(
            "/subscriptions/:id",
            get(subscriptions::get_subscription)
                .put(subscriptions::put_subscription)
                .delete(subscriptions::delete_subscription),
        )
        .with_state(state)
}
