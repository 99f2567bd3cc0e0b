//! Authentication routes — challenge issuance and signed-message verification.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use gatekeeper_auth::ChainClient;
use gatekeeper_common::error::AppError;
use gatekeeper_common::types::{ChallengeResponse, VerificationResult, VerifyRequest};

use crate::state::AppState;

pub fn router<C: ChainClient + 'static>() -> Router<AppState<C>> {
    Router::new()
        .route("/challenge", get(issue_challenge::<C>))
        .route("/verify", post(verify::<C>))
        // Paths used by existing wallet front-ends.
        .route("/api/auth/nonce", get(issue_challenge::<C>))
        .route("/api/auth/verify", post(verify::<C>))
}

/// GET /challenge — Issue a fresh single-use nonce.
async fn issue_challenge<C: ChainClient + 'static>(
    State(state): State<AppState<C>>,
) -> Result<Json<ChallengeResponse>, AppError> {
    let nonce = state.authenticator.issue_challenge()?;
    Ok(Json(ChallengeResponse { nonce }))
}

/// POST /verify — Consume the embedded nonce and verify the signature.
///
/// Body: `{ "address": "0x…", "message": "…", "signature": "0x…" }`.
async fn verify<C: ChainClient + 'static>(
    State(state): State<AppState<C>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationResult>, Response> {
    let Json(request) = payload.map_err(|e| {
        // Bodies cut off by the size limit keep their 413.
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return e.into_response();
        }
        AppError::RequestMalformed(format!("Invalid request body: {}", e.body_text()))
            .into_response()
    })?;

    let result = state
        .authenticator
        .authenticate(&request)
        .await
        .map_err(|e| AppError::from(e).into_response())?;
    Ok(Json(result))
}
