//! Dispatch loop
//!
//! Drains a transaction stream and hands each element to the backrunner as
//! its own spawned task. The loop itself never waits on backrunner work: it
//! blocks only on the next stream element or the shutdown signal.
//!
//! Each task is its own failure domain. Errors and panics are logged and
//! counted, never propagated to the loop. No task handles are retained.
//! Spawned tasks run inside the caller's current span.

use futures::{FutureExt, Stream, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::bot::Backrunner;
use crate::metrics::metrics;
use crate::types::ChainTransaction;

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Stream elements observed and dispatched
    pub received: u64,
}

pub struct Dispatcher {
    backrunner: Arc<dyn Backrunner>,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// `max_in_flight` bounds concurrently executing invocations; spawning
    /// is never bounded
    pub fn new(backrunner: Arc<dyn Backrunner>, max_in_flight: Option<usize>) -> Self {
        Self {
            backrunner,
            limiter: max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Run until the stream ends or `shutdown` turns true
    ///
    /// Tasks already spawned keep running after this returns.
    pub async fn run<S>(&self, transactions: S, mut shutdown: watch::Receiver<bool>) -> DispatchStats
    where
        S: Stream<Item = ChainTransaction> + Send,
    {
        let mut transactions = std::pin::pin!(transactions);
        let mut stats = DispatchStats::default();

        // A dropped sender can no longer stop the loop; keep draining
        let stopped = async move {
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let mut stopped = std::pin::pin!(stopped);

        info!(bounded = self.limiter.is_some(), "Dispatch loop started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => {
                    debug!("Shutdown signal received");
                    break;
                }
                next = transactions.next() => match next {
                    Some(tx) => {
                        stats.received += 1;
                        self.dispatch(tx);
                    }
                    None => {
                        debug!("Transaction stream ended");
                        break;
                    }
                },
            }
        }

        info!(received = stats.received, "Dispatch loop stopped");
        stats
    }

    /// Spawn one isolated invocation for `tx`
    pub fn dispatch(&self, tx: ChainTransaction) {
        let m = metrics();
        m.transactions_received.inc();

        let backrunner = Arc::clone(&self.backrunner);
        let limiter = self.limiter.clone();
        let task_id = Uuid::new_v4();

        tokio::spawn(async move {
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            let m = metrics();
            m.transactions_dispatched.inc();
            m.dispatch_in_flight.inc();
            scopeguard::defer! { metrics().dispatch_in_flight.dec(); }

            let tx_hash = tx.hash().to_string();
            let origin = tx.origin();
            let outcome = AssertUnwindSafe(backrunner.on_transaction(tx))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(true)) => debug!(%task_id, %tx_hash, %origin, "Backrun submitted"),
                Ok(Ok(false)) => debug!(%task_id, %tx_hash, %origin, "No backrun"),
                Ok(Err(e)) => {
                    m.backrun_failures.inc();
                    warn!(%task_id, %tx_hash, %origin, category = e.category(), error = %e, "Backrun failed");
                }
                Err(panic) => {
                    m.backrun_panics.inc();
                    warn!(%task_id, %tx_hash, %origin, panic = %panic_message(&*panic), "Backrun panicked");
                }
            }
        }
        .in_current_span());
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
