//! Test Utilities Module
//!
//! In-memory stand-ins for the chain, used by the unit tests and by the
//! integration suites under `tests/`.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use alloy::primitives::{keccak256, Address, Bytes, TxHash};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::chain::{ChainClient, FeeEstimate};
use crate::errors::{BotError, BotResult};

/// Well-known development key (anvil account #0), never used on a live chain
pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Mock chain for deterministic testing
///
/// By default the pending nonce advances by one for every accepted
/// broadcast, like a node that has seen the transaction.
pub struct MockChainClient {
    chain_id: u64,
    nonce: AtomicU64,
    static_nonce: bool,
    fees: FeeEstimate,
    latency: Duration,
    fail_chain_id: AtomicBool,
    fail_nonce_reads: AtomicBool,
    reject_broadcasts: AtomicUsize,
    nonce_reads: AtomicUsize,
    broadcast_attempts: AtomicUsize,
    broadcasts: Mutex<Vec<Bytes>>,
}

impl MockChainClient {
    pub fn new(chain_id: u64, nonce: u64) -> Self {
        Self {
            chain_id,
            nonce: AtomicU64::new(nonce),
            static_nonce: false,
            fees: FeeEstimate {
                max_fee_per_gas: 20_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
            },
            latency: Duration::ZERO,
            fail_chain_id: AtomicBool::new(false),
            fail_nonce_reads: AtomicBool::new(false),
            reject_broadcasts: AtomicUsize::new(0),
            nonce_reads: AtomicUsize::new(0),
            broadcast_attempts: AtomicUsize::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// Keep reporting the same nonce regardless of broadcasts
    pub fn with_static_nonce(mut self) -> Self {
        self.static_nonce = true;
        self
    }

    /// Delay every call, to widen race windows in concurrency tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_fees(mut self, fees: FeeEstimate) -> Self {
        self.fees = fees;
        self
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn fail_chain_id(&self, fail: bool) {
        self.fail_chain_id.store(fail, Ordering::SeqCst);
    }

    pub fn fail_nonce_reads(&self, fail: bool) {
        self.fail_nonce_reads.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `count` broadcasts
    pub fn reject_next_broadcasts(&self, count: usize) {
        self.reject_broadcasts.store(count, Ordering::SeqCst);
    }

    pub fn nonce_reads(&self) -> usize {
        self.nonce_reads.load(Ordering::SeqCst)
    }

    /// Every `send_raw_transaction` call, accepted or rejected
    pub fn broadcast_attempts(&self) -> usize {
        self.broadcast_attempts.load(Ordering::SeqCst)
    }

    /// Raw bytes of every accepted broadcast, in arrival order
    pub fn broadcasts(&self) -> Vec<Bytes> {
        self.broadcasts.lock().clone()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> BotResult<u64> {
        self.simulate_latency().await;
        if self.fail_chain_id.load(Ordering::SeqCst) {
            return Err(BotError::chain_query("mock chain id unavailable"));
        }
        Ok(self.chain_id)
    }

    async fn nonce_at(&self, _account: Address) -> BotResult<u64> {
        self.simulate_latency().await;
        self.nonce_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_nonce_reads.load(Ordering::SeqCst) {
            return Err(BotError::chain_query("mock nonce unavailable"));
        }
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn fee_estimate(&self) -> BotResult<FeeEstimate> {
        self.simulate_latency().await;
        Ok(self.fees)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BotResult<TxHash> {
        self.simulate_latency().await;
        self.broadcast_attempts.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .reject_broadcasts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(BotError::submission("mock: nonce too low"));
        }

        self.broadcasts.lock().push(Bytes::copy_from_slice(raw));
        if !self.static_nonce {
            self.nonce.fetch_add(1, Ordering::SeqCst);
        }
        Ok(keccak256(raw))
    }
}
