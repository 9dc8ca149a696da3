//! Per-key nonce serialization
//!
//! Every submission path (dispatch loop, relay, withdraw) goes through one
//! [`NonceManager`] per signing key. Acquiring a [`NonceLease`] takes the
//! key's async single-writer lock; the lease is held across the nonce read,
//! signing and broadcast, and the lock is released when the lease drops.
//!
//! The assigned nonce is `max(chain_nonce, next_local)`: the chain count is
//! re-read on every acquisition, and the local cursor only moves forward when
//! a broadcast is committed. A failed broadcast leaves the cursor untouched so
//! the next submission starts again from what the chain reports.

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::chain::ChainClient;
use crate::errors::BotResult;

/// Single-writer nonce allocator for one account
#[derive(Debug)]
pub struct NonceManager {
    account: Address,
    next_local: Arc<Mutex<Option<u64>>>,
}

impl NonceManager {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            next_local: Arc::new(Mutex::new(None)),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Wait for exclusive use of the account, then read its nonce fresh
    ///
    /// Only one lease per account exists at a time. Callers must keep the
    /// lease alive until the broadcast has returned.
    pub async fn acquire(&self, client: &dyn ChainClient) -> BotResult<NonceLease> {
        let guard = Arc::clone(&self.next_local).lock_owned().await;
        let acquired_at = Instant::now();

        let chain_nonce = client.nonce_at(self.account).await?;
        let nonce = match *guard {
            Some(local) if local > chain_nonce => local,
            _ => chain_nonce,
        };

        debug!(
            account = %self.account,
            chain_nonce,
            local_nonce = ?*guard,
            nonce,
            "Nonce lease acquired"
        );

        Ok(NonceLease {
            nonce,
            guard,
            acquired_at,
        })
    }

    /// Last committed cursor, if any
    pub async fn next_local(&self) -> Option<u64> {
        *self.next_local.lock().await
    }
}

/// Exclusive right to use one nonce of an account
///
/// Dropping the lease without [`commit`](Self::commit) releases the account
/// without advancing the local cursor.
pub struct NonceLease {
    nonce: u64,
    guard: OwnedMutexGuard<Option<u64>>,
    acquired_at: Instant,
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Record that a transaction with this nonce was accepted by the network
    pub fn commit(mut self) {
        *self.guard = Some(self.nonce + 1);
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        crate::metrics::metrics()
            .nonce_lease_lifetime
            .observe(self.acquired_at.elapsed().as_secs_f64());
    }
}

impl std::fmt::Debug for NonceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceLease")
            .field("nonce", &self.nonce)
            .field("held_for", &self.acquired_at.elapsed())
            .finish()
    }
}
