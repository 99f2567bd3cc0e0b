//! Personal-message signature verification for EOAs and contract wallets.
//!
//! One entry point, [`SignatureVerifier::verify_message`], picks the scheme
//! from the signature shape and the account's on-chain state:
//!
//! - [EIP-6492](https://eips.ethereum.org/EIPS/eip-6492) wrapped signatures
//!   belong to counterfactual wallets. If the wallet is already deployed the
//!   inner signature goes through ERC-1271; otherwise the factory deployment
//!   and the `isValidSignature` call are simulated together. Nodes without
//!   `eth_simulateV1` get a deployless `eth_call` doing the same two steps.
//! - 64/65-byte signatures that recover to the claimed address are EOA
//!   signatures.
//! - Anything else is checked with ERC-1271 when code exists at the address.

use alloy::primitives::{Address, B256, Bytes, Signature, eip191_hash_message, hex};
use alloy::sol;
use alloy::sol_types::{SolCall, SolType};

use crate::chain::{ChainClient, ChainError, SimulatedCall};

/// The fixed 32-byte suffix marking an ERC-6492 wrapped signature.
pub const ERC6492_MAGIC_SUFFIX: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// Return value of a successful ERC-1271 `isValidSignature`.
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

sol! {
    /// ABI layout of an ERC-6492 wrapper (before the magic suffix).
    struct Erc6492Wrapper {
        address factory;
        bytes factoryCalldata;
        bytes innerSig;
    }

    interface IERC1271 {
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
    }
}

/// Signature bytes classified by wrapper format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureKind {
    /// Counterfactual wallet signature with its deployment data.
    Erc6492 {
        factory: Address,
        factory_calldata: Bytes,
        inner: Bytes,
    },
    /// Unwrapped signature: EOA ECDSA or plain ERC-1271.
    Plain(Bytes),
}

impl SignatureKind {
    /// Classify raw signature bytes. Fails only on a malformed ERC-6492 body.
    pub fn parse(bytes: &[u8]) -> Result<Self, alloy::sol_types::Error> {
        let is_erc6492 = bytes.len() >= 32 && bytes[bytes.len() - 32..] == ERC6492_MAGIC_SUFFIX;
        if !is_erc6492 {
            return Ok(Self::Plain(Bytes::copy_from_slice(bytes)));
        }

        let body = &bytes[..bytes.len() - 32];
        let wrapper = Erc6492Wrapper::abi_decode_params(body)?;
        Ok(Self::Erc6492 {
            factory: wrapper.factory,
            factory_calldata: wrapper.factoryCalldata,
            inner: wrapper.innerSig,
        })
    }
}

/// Recover the signer of `prehash` from a 65-byte or ERC-2098 64-byte signature.
pub fn recover_signer(signature: &[u8], prehash: &B256) -> Option<Address> {
    let signature = match signature.len() {
        65 => Signature::from_raw(signature).ok()?,
        64 => Signature::from_erc2098(signature),
        _ => return None,
    };
    signature
        .normalized_s()
        .recover_address_from_prehash(prehash)
        .ok()
}

fn is_valid_signature_calldata(hash: B256, signature: Bytes) -> Bytes {
    IERC1271::isValidSignatureCall { hash, signature }
        .abi_encode()
        .into()
}

/// `bytes4` return values are left-aligned in a 32-byte word.
fn is_magic_value(return_data: &[u8]) -> bool {
    return_data.len() >= 4 && return_data[..4] == ERC1271_MAGIC_VALUE
}

/// EVM opcodes used by [`deployless_validation_code`].
mod op {
    pub const CODECOPY: u8 = 0x39;
    pub const POP: u8 = 0x50;
    pub const JUMPI: u8 = 0x57;
    pub const GAS: u8 = 0x5a;
    pub const JUMPDEST: u8 = 0x5b;
    pub const PUSH1: u8 = 0x60;
    pub const PUSH4: u8 = 0x63;
    pub const PUSH20: u8 = 0x73;
    pub const CALL: u8 = 0xf1;
    pub const RETURN: u8 = 0xf3;
    pub const STATICCALL: u8 = 0xfa;
    pub const REVERT: u8 = 0xfd;
}

/// Length of the fixed program preceding the two payloads.
const DEPLOYLESS_PROGRAM_LEN: usize = 117;

fn push1(code: &mut Vec<u8>, value: u8) {
    code.extend_from_slice(&[op::PUSH1, value]);
}

// Payloads are bounded by the request body limit, far below 4 GiB.
fn push4(code: &mut Vec<u8>, value: usize) {
    code.push(op::PUSH4);
    code.extend_from_slice(&(value as u32).to_be_bytes());
}

fn push20(code: &mut Vec<u8>, address: Address) {
    code.push(op::PUSH20);
    code.extend_from_slice(address.as_slice());
}

/// Creation code for a deployless `eth_call` that calls `factory` with
/// `factory_calldata`, then returns the first word of `wallet`'s answer to
/// `validation_calldata`. Reverts when the validation call fails.
///
/// Layout is `[program][factory calldata][validation calldata]`; each payload
/// is `CODECOPY`'d to memory 0 before its call. The answer is written past
/// both payloads, into memory that is still zero, so an empty return data
/// reads as a zero word rather than leftover calldata.
pub fn deployless_validation_code(
    factory: Address,
    factory_calldata: &[u8],
    wallet: Address,
    validation_calldata: &[u8],
) -> Bytes {
    let factory_len = factory_calldata.len();
    let validation_len = validation_calldata.len();
    let factory_offset = DEPLOYLESS_PROGRAM_LEN;
    let validation_offset = factory_offset + factory_len;
    let output = factory_len.max(validation_len);

    let mut code = Vec::with_capacity(validation_offset + validation_len);

    push4(&mut code, factory_len);
    push4(&mut code, factory_offset);
    push1(&mut code, 0);
    code.push(op::CODECOPY);

    // factory.call(calldata); a failed deploy shows up as a missing wallet
    push1(&mut code, 0);
    push1(&mut code, 0);
    push4(&mut code, factory_len);
    push1(&mut code, 0);
    push1(&mut code, 0);
    push20(&mut code, factory);
    code.push(op::GAS);
    code.push(op::CALL);
    code.push(op::POP);

    push4(&mut code, validation_len);
    push4(&mut code, validation_offset);
    push1(&mut code, 0);
    code.push(op::CODECOPY);

    push1(&mut code, 32);
    push4(&mut code, output);
    push4(&mut code, validation_len);
    push1(&mut code, 0);
    push20(&mut code, wallet);
    code.push(op::GAS);
    code.push(op::STATICCALL);

    // PUSH1 dest, JUMPI, PUSH1 0, PUSH1 0, REVERT
    let success = code.len() + 8;
    push1(&mut code, success as u8);
    code.push(op::JUMPI);
    push1(&mut code, 0);
    push1(&mut code, 0);
    code.push(op::REVERT);

    code.push(op::JUMPDEST);
    push1(&mut code, 32);
    push4(&mut code, output);
    code.push(op::RETURN);

    debug_assert_eq!(code.len(), DEPLOYLESS_PROGRAM_LEN);
    code.extend_from_slice(factory_calldata);
    code.extend_from_slice(validation_calldata);
    code.into()
}

/// Verifies that an address signed a personal message.
pub struct SignatureVerifier<C> {
    chain: C,
}

impl<C: ChainClient> SignatureVerifier<C> {
    pub fn new(chain: C) -> Self {
        Self { chain }
    }

    /// Check that `signature` is `address`'s EIP-191 signature over `message`.
    ///
    /// `Ok(false)` means the signature does not belong to the address. `Err`
    /// is reserved for failures that say nothing about the signature, such as
    /// an unreachable RPC node.
    pub async fn verify_message(
        &self,
        address: Address,
        message: &str,
        signature: &[u8],
    ) -> Result<bool, ChainError> {
        let hash = eip191_hash_message(message);

        let kind = match SignatureKind::parse(signature) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(%address, error = %e, "Malformed ERC-6492 signature");
                return Ok(false);
            }
        };

        match kind {
            SignatureKind::Erc6492 {
                factory,
                factory_calldata,
                inner,
            } => {
                if self.is_deployed(address).await? {
                    self.verify_erc1271(address, hash, inner).await
                } else {
                    self.verify_counterfactual(address, hash, factory, factory_calldata, inner)
                        .await
                }
            }
            SignatureKind::Plain(bytes) => {
                if recover_signer(&bytes, &hash) == Some(address) {
                    tracing::debug!(%address, "EOA signature recovered");
                    return Ok(true);
                }
                if self.is_deployed(address).await? {
                    self.verify_erc1271(address, hash, bytes).await
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn is_deployed(&self, address: Address) -> Result<bool, ChainError> {
        Ok(!self.chain.code_at(address).await?.is_empty())
    }

    async fn verify_erc1271(
        &self,
        address: Address,
        hash: B256,
        signature: Bytes,
    ) -> Result<bool, ChainError> {
        let calldata = is_valid_signature_calldata(hash, signature);
        match self.chain.call(address, calldata).await {
            Ok(output) => {
                let valid = is_magic_value(&output);
                tracing::debug!(%address, valid, "ERC-1271 check");
                Ok(valid)
            }
            Err(ChainError::Reverted(reason)) => {
                tracing::debug!(%address, %reason, "ERC-1271 check reverted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn verify_counterfactual(
        &self,
        address: Address,
        hash: B256,
        factory: Address,
        factory_calldata: Bytes,
        inner: Bytes,
    ) -> Result<bool, ChainError> {
        let validation = is_valid_signature_calldata(hash, inner);
        let calls = vec![
            SimulatedCall {
                to: factory,
                data: factory_calldata.clone(),
            },
            SimulatedCall {
                to: address,
                data: validation.clone(),
            },
        ];

        let results = match self.chain.simulate(calls).await {
            Ok(results) => results,
            Err(ChainError::Unsupported(reason)) => {
                tracing::debug!(%address, %reason, "Block simulation unavailable, using deployless call");
                return self
                    .verify_deployless(address, factory, &factory_calldata, &validation)
                    .await;
            }
            Err(e) => return Err(e),
        };
        let valid = match results.as_slice() {
            [deploy, check] => deploy.success && check.success && is_magic_value(&check.return_data),
            _ => false,
        };

        tracing::debug!(%address, %factory, valid, "ERC-6492 simulated check");
        Ok(valid)
    }

    async fn verify_deployless(
        &self,
        address: Address,
        factory: Address,
        factory_calldata: &[u8],
        validation: &[u8],
    ) -> Result<bool, ChainError> {
        let code = deployless_validation_code(factory, factory_calldata, address, validation);
        match self.chain.deploy_call(code).await {
            Ok(output) => {
                let valid = is_magic_value(&output);
                tracing::debug!(%address, %factory, valid, "ERC-6492 deployless check");
                Ok(valid)
            }
            Err(ChainError::Reverted(reason)) => {
                tracing::debug!(%address, %reason, "ERC-6492 deployless check reverted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
