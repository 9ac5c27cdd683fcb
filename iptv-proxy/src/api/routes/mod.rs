//! API route definitions.

pub mod feeds;
pub mod health;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(feeds::router())
        .with_state(state)
}
