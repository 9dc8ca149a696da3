//! Chain client adapter
//!
//! The signer only needs four things from the chain: its ID, the operator's
//! next nonce, current fee levels and a way to broadcast raw bytes. They are
//! behind [`ChainClient`] so tests and alternative transports can stand in for
//! the JSON-RPC implementation.

use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::debug;

use crate::errors::{BotError, BotResult};

/// EIP-1559 fee levels, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Read chain state and broadcast transactions
///
/// Every call is a network round trip with variable latency; implementations
/// must not be called while holding a thread-blocking lock.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> BotResult<u64>;

    /// Next nonce for `account`, including pending transactions
    async fn nonce_at(&self, account: Address) -> BotResult<u64>;

    async fn fee_estimate(&self) -> BotResult<FeeEstimate>;

    /// Broadcast an EIP-2718 encoded transaction
    ///
    /// Rejections surface as [`BotError::Submission`].
    async fn send_raw_transaction(&self, raw: &[u8]) -> BotResult<TxHash>;
}

/// JSON-RPC chain client over HTTP
pub struct RpcChainClient {
    provider: RootProvider<Http<Client>>,
    url: String,
}

impl RpcChainClient {
    /// Build a client for `url`; no request is made until first use
    pub fn dial(url: &str) -> BotResult<Self> {
        let parsed = url
            .parse()
            .map_err(|e| BotError::Config(format!("invalid eth_rpc url {}: {}", url, e)))?;
        Ok(Self {
            provider: ProviderBuilder::new().on_http(parsed),
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> BotResult<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| BotError::chain_query(format!("eth_chainId: {}", e)))
    }

    async fn nonce_at(&self, account: Address) -> BotResult<u64> {
        let nonce = self
            .provider
            .get_transaction_count(account)
            .pending()
            .await
            .map_err(|e| BotError::chain_query(format!("eth_getTransactionCount: {}", e)))?;
        debug!(%account, nonce, "Fetched account nonce");
        Ok(nonce)
    }

    async fn fee_estimate(&self) -> BotResult<FeeEstimate> {
        let estimate = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| BotError::chain_query(format!("fee estimation: {}", e)))?;
        Ok(FeeEstimate {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BotResult<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| BotError::submission(format!("eth_sendRawTransaction: {}", e)))?;
        Ok(*pending.tx_hash())
    }
}
