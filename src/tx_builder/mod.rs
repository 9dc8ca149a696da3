//! Transaction builder
//!
//! Turns a [`ContractCall`](crate::types::ContractCall) into a signed,
//! nonce-correct EIP-1559 transaction and broadcasts it.
//!
//! ## Submission sequence
//!
//! 1. Lease the operator's nonce (`NonceManager::acquire`), which serializes
//!    every submission path sharing the key and reads the chain nonce fresh
//! 2. Resolve fee levels (fixed, or estimated from the chain)
//! 3. Build the type-2 request with the fixed gas ceiling and sign it
//! 4. Broadcast exactly once; commit the lease only if the node accepted it
//!
//! ## Errors
//!
//! - `ChainQuery`: nonce or fee lookup failed, retry with a fresh lease
//! - `ContractCall`: the request could not be constructed or signed
//! - `Submission`: the node rejected the broadcast, retry with a fresh lease

mod builder;
mod gas;

pub use builder::TxBuilder;
pub use gas::{FeePolicy, GasPolicy, DEFAULT_GAS_LIMIT};
