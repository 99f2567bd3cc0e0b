//! Verification pipeline for signed sign-in assertions.
//!
//! Each attempt moves through
//! `Received → ChallengeExtracted → NonceConsumed → SignatureChecked`
//! and ends either authenticated or rejected with a specific reason. The nonce
//! is consumed before any signature work and is never restored, so a failed
//! or abandoned attempt always needs a fresh challenge.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use thiserror::Error;

use gatekeeper_common::error::AppError;
use gatekeeper_common::types::{VerificationResult, VerifyRequest};

use crate::chain::{ChainClient, ChainError};
use crate::extract::NonceExtractor;
use crate::nonce::{NonceAuthority, NonceError};
use crate::signature::SignatureVerifier;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing required fields: address, message, signature")]
    MissingFields,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("Invalid message format - nonce not found")]
    NonceNotFound,

    #[error("Invalid or reused nonce")]
    NonceInvalidOrReused,

    #[error("Message address does not match claimed address")]
    AddressMismatch,

    #[error("Message expired or not yet valid")]
    MessageNotCurrentlyValid,

    #[error("Invalid signature")]
    SignatureMismatch,

    #[error("Signature backend failed: {0}")]
    Backend(#[from] ChainError),

    #[error("Failed to generate nonce: {0}")]
    Nonce(#[from] NonceError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingFields
            | AuthError::InvalidAddress(_)
            | AuthError::InvalidSignatureEncoding(_)
            | AuthError::AddressMismatch => AppError::RequestMalformed(err.to_string()),
            AuthError::NonceNotFound => AppError::ChallengeFormatInvalid,
            AuthError::NonceInvalidOrReused => AppError::ChallengeInvalidOrReused,
            AuthError::SignatureMismatch | AuthError::MessageNotCurrentlyValid => {
                AppError::SignatureInvalid(err.to_string())
            }
            AuthError::Backend(_) | AuthError::Nonce(_) => AppError::Internal(err.to_string()),
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, AuthError> {
    if !raw.starts_with("0x") {
        return Err(AuthError::InvalidAddress(
            "address must be 0x-prefixed".to_string(),
        ));
    }
    Address::from_str(raw).map_err(|e| AuthError::InvalidAddress(e.to_string()))
}

fn parse_signature(raw: &str) -> Result<Vec<u8>, AuthError> {
    let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| AuthError::InvalidSignatureEncoding(e.to_string()))?;
    if bytes.is_empty() {
        return Err(AuthError::InvalidSignatureEncoding(
            "signature is empty".to_string(),
        ));
    }
    Ok(bytes)
}

/// Issues challenges and verifies signed assertions against them.
pub struct Authenticator<C> {
    nonces: Arc<NonceAuthority>,
    extractor: NonceExtractor,
    verifier: SignatureVerifier<C>,
    siwe_strict: bool,
}

impl<C: ChainClient> Authenticator<C> {
    pub fn new(nonces: Arc<NonceAuthority>, chain: C) -> Self {
        Self {
            nonces,
            extractor: NonceExtractor::new(),
            verifier: SignatureVerifier::new(chain),
            siwe_strict: true,
        }
    }

    /// Enable or disable the EIP-4361 address and validity-window checks.
    pub fn with_siwe_strict(mut self, siwe_strict: bool) -> Self {
        self.siwe_strict = siwe_strict;
        self
    }

    /// Replace the default challenge extractor.
    pub fn with_extractor(mut self, extractor: NonceExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn nonces(&self) -> &Arc<NonceAuthority> {
        &self.nonces
    }

    /// Issue a fresh challenge.
    pub fn issue_challenge(&self) -> Result<String, AuthError> {
        Ok(self.nonces.issue()?)
    }

    /// Run one verification attempt.
    pub async fn authenticate(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerificationResult, AuthError> {
        let (raw_address, message, raw_signature) =
            request.fields().ok_or(AuthError::MissingFields)?;
        let address = parse_address(raw_address)?;
        let signature = parse_signature(raw_signature)?;

        let nonce = self
            .extractor
            .extract(message)
            .map_err(|_| AuthError::NonceNotFound)?;

        if !self.nonces.consume(nonce) {
            tracing::warn!(%address, "Rejected invalid or reused nonce");
            return Err(AuthError::NonceInvalidOrReused);
        }
        tracing::debug!(%address, "Nonce consumed");

        if self.siwe_strict {
            check_siwe_fields(address, message)?;
        }

        let valid = self
            .verifier
            .verify_message(address, message, &signature)
            .await
            .inspect_err(|e| {
                tracing::error!(%address, error = %e, "Signature verification backend failed");
            })?;

        if !valid {
            tracing::warn!(%address, "Rejected invalid signature");
            return Err(AuthError::SignatureMismatch);
        }

        tracing::info!(%address, "Address authenticated");
        Ok(VerificationResult::authenticated(raw_address))
    }
}

/// Extra checks for messages that parse as full EIP-4361 text. Free-form
/// messages pass through untouched.
fn check_siwe_fields(address: Address, message: &str) -> Result<(), AuthError> {
    let Ok(parsed) = message.parse::<siwe::Message>() else {
        return Ok(());
    };

    if Address::from(parsed.address) != address {
        tracing::warn!(
            %address,
            message_address = %Address::from(parsed.address),
            "SIWE message address mismatch"
        );
        return Err(AuthError::AddressMismatch);
    }

    if !parsed.valid_now() {
        tracing::warn!(%address, "SIWE message outside its validity window");
        return Err(AuthError::MessageNotCurrentlyValid);
    }

    Ok(())
}
