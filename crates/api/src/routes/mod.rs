pub mod auth;
pub mod health;

use axum::Router;
use gatekeeper_auth::ChainClient;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

/// Sign-in payloads are a short message plus a signature.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the complete API router with all routes.
pub fn create_router<C: ChainClient + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
