//! Shared application state for the Axum API server.

use std::sync::Arc;

use gatekeeper_auth::{Authenticator, ChainClient, NonceAuthority, RpcChainClient};
use gatekeeper_common::config::AppConfig;

/// Application state shared across all route handlers via Axum `State`.
pub struct AppState<C = RpcChainClient> {
    pub authenticator: Arc<Authenticator<C>>,
    pub config: AppConfig,
}

impl<C: ChainClient> AppState<C> {
    pub fn new(nonces: Arc<NonceAuthority>, chain: C, config: AppConfig) -> Self {
        let authenticator = Authenticator::new(nonces, chain).with_siwe_strict(config.siwe_strict);
        Self {
            authenticator: Arc::new(authenticator),
            config,
        }
    }

    pub fn nonces(&self) -> &Arc<NonceAuthority> {
        self.authenticator.nonces()
    }
}

// Manual impl: `C` itself need not be `Clone`.
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
            config: self.config.clone(),
        }
    }
}
