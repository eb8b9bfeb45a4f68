//! API Module
//!
//! The broker's HTTP surface: one authenticated protocol endpoint and an
//! unauthenticated health check.

pub mod frames;
pub mod health;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::state::AppState;

/// Create the broker router.
///
/// The protocol endpoint sits behind the signature middleware; `/health` is
/// added after the layer so load balancers can probe it without a key.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(frames::handle_frame))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::signed_exchange,
        ))
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
