//! Gatekeeper HTTP boundary: challenge issuance and signed-assertion
//! verification over axum.

pub mod routes;
pub mod state;
