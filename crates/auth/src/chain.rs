//! Read-only chain access used by contract-wallet signature checks.
//!
//! [`ChainClient`] is the seam between signature verification and the network:
//! the production [`RpcChainClient`] talks JSON-RPC through alloy, tests plug
//! in an in-memory implementation.

use std::future::Future;

use alloy::primitives::{Address, Bytes, U64};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportError};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The node executed the call and it reverted.
    #[error("Call reverted: {0}")]
    Reverted(String),

    /// Transport or node failure; says nothing about the signature.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node does not implement the requested method.
    #[error("Unsupported by node: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// JSON-RPC code for an execution revert (EIP-1474 / geth).
const EXECUTION_REVERTED_CODE: i64 = 3;
const METHOD_NOT_FOUND_CODE: i64 = -32601;

fn is_revert(code: i64, message: &str) -> bool {
    code == EXECUTION_REVERTED_CODE || message.starts_with("execution reverted")
}

fn is_method_missing(code: i64, message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    code == METHOD_NOT_FOUND_CODE
        || message.contains("method not found")
        || message.contains("does not exist")
        || message.contains("not supported")
}

// Only a revert says something about the signature; rate limits, missing
// blocks and other node errors stay transport failures.
impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) if is_revert(payload.code, &payload.message) => {
                ChainError::Reverted(payload.message.to_string())
            }
            RpcError::ErrorResp(payload) if is_method_missing(payload.code, &payload.message) => {
                ChainError::Unsupported(payload.message.to_string())
            }
            RpcError::ErrorResp(payload) => {
                ChainError::Rpc(format!("node error {}: {}", payload.code, payload.message))
            }
            other => ChainError::Rpc(other.to_string()),
        }
    }
}

/// A call executed inside a simulated block.
#[derive(Debug, Clone)]
pub struct SimulatedCall {
    pub to: Address,
    pub data: Bytes,
}

/// Outcome of one [`SimulatedCall`].
#[derive(Debug, Clone)]
pub struct SimulatedCallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Read-only view of chain state.
pub trait ChainClient: Send + Sync {
    /// Deployed bytecode at `address`; empty for EOAs and undeployed contracts.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// `eth_call` against the latest block.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// `eth_call` without a target: runs `init_code` as creation code and
    /// returns whatever it returns. Nothing is deployed.
    fn deploy_call(
        &self,
        init_code: Bytes,
    ) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// Execute `calls` in order within one simulated block, so later calls
    /// observe state written by earlier ones. Nothing is broadcast.
    fn simulate(
        &self,
        calls: Vec<SimulatedCall>,
    ) -> impl Future<Output = Result<Vec<SimulatedCallResult>, ChainError>> + Send;
}

#[derive(Debug, Deserialize)]
struct SimulatedBlockResponse {
    calls: Vec<SimulatedCallResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCallResponse {
    return_data: Bytes,
    status: U64,
}

/// [`ChainClient`] backed by an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
}

impl RpcChainClient {
    pub fn connect(rpc_url: &str) -> Result<Self, ChainError> {
        let url: alloy::transports::http::reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        tracing::info!(rpc_url, "Chain client configured");
        Ok(Self { provider })
    }
}

impl ChainClient for RpcChainClient {
    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default().to(to).input(data.into());
        Ok(self.provider.call(tx).await?)
    }

    async fn deploy_call(&self, init_code: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default().input(init_code.into());
        Ok(self.provider.call(tx).await?)
    }

    /// Uses `eth_simulateV1`; nodes without it surface as [`ChainError::Unsupported`].
    async fn simulate(
        &self,
        calls: Vec<SimulatedCall>,
    ) -> Result<Vec<SimulatedCallResult>, ChainError> {
        let calls: Vec<_> = calls
            .iter()
            .map(|c| json!({ "to": c.to, "data": c.data }))
            .collect();
        let params = json!([{ "blockStateCalls": [{ "calls": calls }] }, "latest"]);

        let blocks: Vec<SimulatedBlockResponse> = self
            .provider
            .raw_request("eth_simulateV1".into(), params)
            .await?;

        let block = blocks
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::Rpc("eth_simulateV1 returned no blocks".to_string()))?;

        Ok(block
            .calls
            .into_iter()
            .map(|c| SimulatedCallResult {
                success: c.status == U64::from(1u64),
                return_data: c.return_data,
            })
            .collect())
    }
}
