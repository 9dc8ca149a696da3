//! Core data types shared by the feed, the bot and the signer

use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an observed transaction entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxOrigin {
    /// Polled from the chain's mempool feed
    Feed,
    /// Submitted through the relay API
    Relay,
}

impl fmt::Display for TxOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed => write!(f, "feed"),
            Self::Relay => write!(f, "relay"),
        }
    }
}

/// A transaction observed on the chain or submitted to the relay
///
/// Immutable once constructed. The feed may deliver the same transaction
/// more than once; nothing here deduplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    hash: String,
    raw: Bytes,
    origin: TxOrigin,
}

impl ChainTransaction {
    pub fn new(hash: impl Into<String>, raw: impl Into<Bytes>, origin: TxOrigin) -> Self {
        Self {
            hash: hash.into(),
            raw: raw.into(),
            origin,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn origin(&self) -> TxOrigin {
        self.origin
    }
}

/// A contract method invocation to be wrapped in a signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub input: Bytes,
    pub value: U256,
}

impl ContractCall {
    pub fn new(to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            to,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// A signed, broadcast-ready transaction
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    hash: TxHash,
    nonce: u64,
    chain_id: u64,
    raw: Bytes,
    envelope: TxEnvelope,
}

impl SignedTransaction {
    pub(crate) fn new(
        hash: TxHash,
        nonce: u64,
        chain_id: u64,
        raw: Bytes,
        envelope: TxEnvelope,
    ) -> Self {
        Self {
            hash,
            nonce,
            chain_id,
            raw,
            envelope,
        }
    }

    /// Hash used to track the transaction after broadcast
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// EIP-2718 encoded bytes as sent to `eth_sendRawTransaction`
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn envelope(&self) -> &TxEnvelope {
        &self.envelope
    }
}
