//! Wallet challenge/response authentication core.
//!
//! - [`nonce`]: issues single-use challenges and expires them in bulk
//! - [`extract`]: locates the challenge inside a free-form signed message
//! - [`signature`] and [`chain`]: EOA, ERC-1271 and ERC-6492 signature checks
//! - [`authenticator`]: the verification pipeline tying the pieces together

pub mod authenticator;
pub mod chain;
pub mod extract;
pub mod nonce;
pub mod signature;

pub use authenticator::{AuthError, Authenticator};
pub use chain::{ChainClient, ChainError, RpcChainClient};
pub use nonce::{NonceAuthority, NonceError};
