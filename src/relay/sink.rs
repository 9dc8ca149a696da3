//! What the relay does with an accepted transaction.
//!
//! The handler validates the request and hands the JSON payload to a
//! [`RelaySink`]. Which sink is wired in decides whether relayed
//! transactions are only acknowledged, evaluated on the request path, or
//! queued into the dispatch loop; the handler contract is the same for all.

use alloy::primitives::keccak256;
use async_trait::async_trait;
use base64::Engine;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bot::Backrunner;
use crate::config::ForwardPolicy;
use crate::errors::{BotError, BotResult};
use crate::feed::{receiver_stream, tendermint_tx_hash};
use crate::types::{ChainTransaction, TxOrigin};

/// Receives validated relay payloads.
///
/// `Ok(None)` answers 200 with an empty body, `Ok(Some(v))` answers 200
/// with `v`. `RequestValidation` errors become 400s, anything else a 500.
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn forward(&self, payload: Value) -> BotResult<Option<Value>>;
}

/// Candidate transaction body: `{"hash": "...", "tx": "0x..." | "<base64>"}`.
#[derive(Debug, Deserialize)]
struct RelayedTransaction {
    #[serde(default)]
    hash: Option<String>,
    tx: String,
}

/// Decode a relay payload into a [`ChainTransaction`].
///
/// `0x`-prefixed payloads are raw EVM transactions (hash = keccak256);
/// anything else is read as a base64 Cosmos transaction (hash = Tendermint
/// SHA-256). An explicit `hash` field wins.
pub fn decode_relayed(payload: Value) -> BotResult<ChainTransaction> {
    let relayed: RelayedTransaction = serde_json::from_value(payload).map_err(|e| {
        debug!(error = %e, "Rejecting relay payload");
        BotError::invalid_request("invalid transaction payload")
    })?;

    let encoded = relayed.tx.trim();
    let (raw, computed_hash) = if let Some(hex_body) = encoded.strip_prefix("0x") {
        let raw = hex::decode(hex_body)
            .map_err(|_| BotError::invalid_request("tx is not valid hex"))?;
        let hash = keccak256(&raw).to_string();
        (raw, hash)
    } else {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| BotError::invalid_request("tx is not valid base64"))?;
        let hash = tendermint_tx_hash(&raw);
        (raw, hash)
    };

    if raw.is_empty() {
        return Err(BotError::invalid_request("tx is empty"));
    }

    let hash = relayed
        .hash
        .filter(|h| !h.trim().is_empty())
        .unwrap_or(computed_hash);
    Ok(ChainTransaction::new(hash, raw, TxOrigin::Relay))
}

/// Acknowledge receipt only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgeSink;

#[async_trait]
impl RelaySink for AcknowledgeSink {
    async fn forward(&self, _payload: Value) -> BotResult<Option<Value>> {
        Ok(None)
    }
}

/// Evaluate immediately on the request path.
pub struct EvaluateSink {
    backrunner: Arc<dyn Backrunner>,
}

impl EvaluateSink {
    pub fn new(backrunner: Arc<dyn Backrunner>) -> Self {
        Self { backrunner }
    }
}

#[async_trait]
impl RelaySink for EvaluateSink {
    async fn forward(&self, payload: Value) -> BotResult<Option<Value>> {
        let tx = decode_relayed(payload)?;
        let hash = tx.hash().to_string();
        let submitted = self.backrunner.on_transaction(tx).await?;
        debug!(tx_hash = %hash, submitted, "Relayed transaction evaluated");
        Ok(Some(json!({ "hash": hash, "submitted": submitted })))
    }
}

/// Queue into the dispatch loop.
pub struct QueueSink {
    queue: mpsc::UnboundedSender<ChainTransaction>,
}

impl QueueSink {
    /// Sink plus the stream the dispatch loop should merge with the feed.
    pub fn channel() -> (Self, BoxStream<'static, ChainTransaction>) {
        let (queue, rx) = mpsc::unbounded_channel();
        (Self { queue }, receiver_stream(rx))
    }
}

#[async_trait]
impl RelaySink for QueueSink {
    async fn forward(&self, payload: Value) -> BotResult<Option<Value>> {
        let tx = decode_relayed(payload)?;
        let hash = tx.hash().to_string();
        self.queue
            .send(tx)
            .map_err(|_| BotError::ServerLifecycle("dispatch queue closed".to_string()))?;
        debug!(tx_hash = %hash, "Relayed transaction queued");
        Ok(Some(json!({ "hash": hash, "queued": true })))
    }
}

/// Build the sink for `policy`.
///
/// The queue policy also returns the stream to merge into the dispatch loop.
pub fn sink_for_policy(
    policy: ForwardPolicy,
    backrunner: Arc<dyn Backrunner>,
) -> (Arc<dyn RelaySink>, Option<BoxStream<'static, ChainTransaction>>) {
    match policy {
        ForwardPolicy::Acknowledge => (Arc::new(AcknowledgeSink), None),
        ForwardPolicy::Evaluate => (Arc::new(EvaluateSink::new(backrunner)), None),
        ForwardPolicy::Queue => {
            let (sink, stream) = QueueSink::channel();
            (Arc::new(sink), Some(stream))
        }
    }
}
