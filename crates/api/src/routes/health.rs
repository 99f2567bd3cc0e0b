//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use gatekeeper_auth::ChainClient;

use crate::state::AppState;

pub fn router<C: ChainClient + 'static>() -> Router<AppState<C>> {
    Router::new().route("/health", get(health_check::<C>))
}

async fn health_check<C: ChainClient + 'static>(
    State(state): State<AppState<C>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "gatekeeper-api",
        "version": env!("CARGO_PKG_VERSION"),
        "outstanding_nonces": state.nonces().size(),
        "nonce_epoch": state.nonces().epoch(),
    }))
}
