//! tinymart server - real-time delivery updates
//!
//! This crate serves delivery status subscriptions over WebSocket with:
//! - `graphql-ws` subscription sessions multiplexed per connection
//! - Fan-out of every recorded status change to matching subscribers
//! - An HTTP write path that records status changes and publishes them

pub mod config;
pub mod error;
pub mod mutation;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Path of the subscription WebSocket endpoint.
pub const SUBSCRIPTION_PATH: &str = "/graphql/ws";

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .merge(routes::health::routes())
        // Write path
        .merge(routes::purchases::routes())
        .merge(routes::deliveries::routes())
        // Subscriptions
        .route(SUBSCRIPTION_PATH, get(ws::ws_subscriptions))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
