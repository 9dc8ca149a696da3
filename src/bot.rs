//! Backrunner
//!
//! [`Bot`] evaluates each observed transaction through a pluggable
//! [`Strategy`] and, when the strategy finds an opportunity, submits the
//! resulting multihop call through the shared [`TxBuilder`].
//!
//! One invocation makes at most one submission. A rejected broadcast comes
//! back as the classified [`BotError`]; whether to try again with a fresh
//! nonce is up to whoever feeds the backrunner.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::BotResult;
use crate::tx_builder::TxBuilder;
use crate::types::{ChainTransaction, ContractCall};

/// Reacts to observed transactions
///
/// Invoked concurrently for distinct transactions from both the dispatch
/// loop and the relay. Returns whether a response transaction was broadcast.
/// Implementations call the signer at most once per invocation.
#[async_trait]
pub trait Backrunner: Send + Sync {
    async fn on_transaction(&self, tx: ChainTransaction) -> BotResult<bool>;
}

/// A backrun the strategy wants executed on the multihop contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub calldata: Bytes,
    pub value: U256,
}

/// Opportunity evaluation
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn evaluate(&self, tx: &ChainTransaction) -> BotResult<Option<Opportunity>>;
}

/// Strategy that never acts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStrategy;

#[async_trait]
impl Strategy for NoopStrategy {
    async fn evaluate(&self, _tx: &ChainTransaction) -> BotResult<Option<Opportunity>> {
        Ok(None)
    }
}

pub struct Bot {
    strategy: Arc<dyn Strategy>,
    tx_builder: Arc<TxBuilder>,
    multihop: Address,
}

impl Bot {
    pub fn new(
        strategy: Arc<dyn Strategy>,
        tx_builder: Arc<TxBuilder>,
        multihop: Address,
    ) -> Self {
        Self {
            strategy,
            tx_builder,
            multihop,
        }
    }

    pub fn multihop(&self) -> Address {
        self.multihop
    }

    /// Check that the chain answers for the operator account before serving
    pub async fn start(&self) -> BotResult<()> {
        let operator = self.tx_builder.operator();
        let nonce = self.tx_builder.client().nonce_at(operator).await?;
        info!(
            %operator,
            multihop = %self.multihop,
            chain_id = self.tx_builder.chain_id(),
            nonce,
            "Backrunner started"
        );
        Ok(())
    }
}

#[async_trait]
impl Backrunner for Bot {
    async fn on_transaction(&self, tx: ChainTransaction) -> BotResult<bool> {
        let Some(opportunity) = self.strategy.evaluate(&tx).await? else {
            debug!(tx_hash = tx.hash(), origin = %tx.origin(), "No opportunity");
            return Ok(false);
        };

        let call = ContractCall::new(self.multihop, opportunity.calldata)
            .with_value(opportunity.value);
        let signed = match self.tx_builder.submit(call).await {
            Ok(signed) => signed,
            Err(e) => {
                warn!(
                    tx_hash = tx.hash(),
                    category = e.category(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Backrun submission failed"
                );
                return Err(e);
            }
        };

        crate::metrics::metrics().backruns_submitted.inc();
        info!(
            tx_hash = tx.hash(),
            backrun = %signed.hash(),
            nonce = signed.nonce(),
            origin = %tx.origin(),
            "Backrun submitted"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("multihop", &self.multihop)
            .field("tx_builder", &self.tx_builder)
            .finish_non_exhaustive()
    }
}
