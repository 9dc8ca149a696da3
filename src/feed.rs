//! Transaction feed
//!
//! The feed turns a chain's mempool into an unbounded stream of
//! [`ChainTransaction`]s. [`PollingFeed`] polls a Tendermint RPC node's
//! `unconfirmed_txs` endpoint on a fixed interval.
//!
//! Delivery is at-least-once and unordered with respect to the chain. A
//! transaction is emitted when it first shows up in a poll; it is emitted
//! again if it leaves the mempool snapshot and comes back.

use base64::Engine;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};

use crate::errors::{BotError, BotResult};
use crate::types::{ChainTransaction, TxOrigin};

/// Transactions requested per poll
pub const DEFAULT_POLL_LIMIT: usize = 100;

/// Bound on one poll, used when the configuration does not set one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of newly observed chain transactions
pub trait TransactionFeed: Send + Sync {
    /// Start an independent subscription
    ///
    /// Each call gets its own poll state. The stream never ends on its own;
    /// dropping it stops the producer. Must be called within a tokio runtime.
    fn subscribe(&self) -> BoxStream<'static, ChainTransaction>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<UnconfirmedTxs>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UnconfirmedTxs {
    #[serde(default)]
    txs: Option<Vec<String>>,
}

/// Tendermint transaction hash: uppercase hex SHA-256 of the raw bytes
pub fn tendermint_tx_hash(raw: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(raw))
}

/// Polls `GET {rpc}/unconfirmed_txs?limit=N`
#[derive(Debug, Clone)]
pub struct PollingFeed {
    http: reqwest::Client,
    rpc: String,
    poll_interval: Duration,
    limit: usize,
}

impl PollingFeed {
    /// A node that accepts the connection but never answers costs one
    /// `request_timeout`, then the next tick polls again.
    pub fn new(
        rpc: impl Into<String>,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| BotError::Config(format!("feed http client: {}", e)))?;

        Ok(Self {
            http,
            rpc: rpc.into().trim_end_matches('/').to_string(),
            poll_interval,
            limit: DEFAULT_POLL_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Fetch the current mempool snapshot
    pub async fn poll_once(&self) -> BotResult<Vec<ChainTransaction>> {
        let url = format!("{}/unconfirmed_txs", self.rpc);
        let response = self
            .http
            .get(&url)
            .query(&[("limit", self.limit.to_string())])
            .send()
            .await
            .map_err(|e| BotError::chain_query(format!("unconfirmed_txs: {}", e)))?
            .error_for_status()
            .map_err(|e| BotError::chain_query(format!("unconfirmed_txs: {}", e)))?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| BotError::chain_query(format!("unconfirmed_txs body: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(BotError::chain_query(format!("unconfirmed_txs rpc error: {}", error)));
        }

        let encoded = envelope.result.and_then(|r| r.txs).unwrap_or_default();
        let mut txs = Vec::with_capacity(encoded.len());
        for entry in encoded {
            match base64::engine::general_purpose::STANDARD.decode(entry.as_bytes()) {
                Ok(raw) => {
                    let hash = tendermint_tx_hash(&raw);
                    txs.push(ChainTransaction::new(hash, raw, TxOrigin::Feed));
                }
                Err(e) => warn!(error = %e, "Skipping undecodable mempool entry"),
            }
        }
        Ok(txs)
    }

    async fn run(self, tx: mpsc::UnboundedSender<ChainTransaction>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous: HashSet<String> = HashSet::new();

        info!(rpc = %self.rpc, poll_ms = self.poll_interval.as_millis() as u64, "Transaction feed polling");

        loop {
            interval.tick().await;
            if tx.is_closed() {
                break;
            }

            let snapshot = match self.poll_once().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "Feed poll failed");
                    continue;
                }
            };

            let mut current = HashSet::with_capacity(snapshot.len());
            for chain_tx in snapshot {
                let is_new = !previous.contains(chain_tx.hash());
                current.insert(chain_tx.hash().to_string());
                if is_new && tx.send(chain_tx).is_err() {
                    debug!("Feed subscriber dropped");
                    return;
                }
            }
            previous = current;
        }
        debug!("Feed subscriber dropped");
    }
}

impl TransactionFeed for PollingFeed {
    fn subscribe(&self) -> BoxStream<'static, ChainTransaction> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run(tx).in_current_span());
        receiver_stream(rx)
    }
}

/// Adapt an unbounded receiver into a stream
pub fn receiver_stream<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}
