//! Dispatch loop delivery and isolation

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::timeout;
use tracing::Instrument;

use super::test_helpers::feed_tx;
use crate::bot::Backrunner;
use crate::dispatch::Dispatcher;
use crate::errors::{BotError, BotResult};
use crate::feed::receiver_stream;
use crate::logging::{service_span, SERVICE_NAME};
use crate::types::ChainTransaction;

/// Records every invocation; fails or panics on chosen hashes
#[derive(Default)]
struct RecordingBackrunner {
    seen: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
    panic_on: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    done: Notify,
}

impl RecordingBackrunner {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    /// Wait until `n` invocations have completed
    async fn wait_for(&self, n: usize) {
        timeout(Duration::from_secs(10), async {
            loop {
                let notified = self.done.notified();
                if self.seen.lock().len() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("invocations completed");
    }
}

#[async_trait]
impl Backrunner for RecordingBackrunner {
    async fn on_transaction(&self, tx: ChainTransaction) -> BotResult<bool> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        scopeguard::defer! {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().push(tx.hash().to_string());
            self.done.notify_waiters();
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_on.contains(tx.hash()) {
            panic!("strategy blew up on {}", tx.hash());
        }
        if self.fail_on.contains(tx.hash()) {
            return Err(BotError::submission("rejected"));
        }
        Ok(false)
    }
}

fn idle_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[tokio::test]
async fn test_every_transaction_dispatched_once() {
    let backrunner = Arc::new(RecordingBackrunner::default());
    let dispatcher = Dispatcher::new(backrunner.clone(), None);
    let txs: Vec<_> = (0..50).map(feed_tx).collect();

    let (_tx, rx) = idle_shutdown();
    let stats = dispatcher.run(stream::iter(txs.clone()), rx).await;
    assert_eq!(stats.received, 50);

    backrunner.wait_for(50).await;
    let mut seen = backrunner.seen();
    seen.sort();
    let mut expected: Vec<_> = txs.iter().map(|t| t.hash().to_string()).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_duplicates_are_dispatched_per_occurrence() {
    let backrunner = Arc::new(RecordingBackrunner::default());
    let dispatcher = Dispatcher::new(backrunner.clone(), None);
    let txs = vec![feed_tx(1), feed_tx(1), feed_tx(2)];

    let (_tx, rx) = idle_shutdown();
    dispatcher.run(stream::iter(txs), rx).await;

    backrunner.wait_for(3).await;
    let seen = backrunner.seen();
    assert_eq!(seen.iter().filter(|h| *h == feed_tx(1).hash()).count(), 2);
    assert_eq!(seen.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failures_and_panics_are_isolated() {
    let backrunner = Arc::new(RecordingBackrunner {
        fail_on: [feed_tx(3).hash().to_string()].into_iter().collect(),
        panic_on: [feed_tx(7).hash().to_string()].into_iter().collect(),
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(backrunner.clone(), None);

    let (_tx, rx) = idle_shutdown();
    let stats = dispatcher.run(stream::iter((0..20).map(feed_tx)), rx).await;
    assert_eq!(stats.received, 20);

    backrunner.wait_for(20).await;
    assert_eq!(backrunner.seen().len(), 20);
}

#[tokio::test]
async fn test_loop_does_not_wait_for_slow_invocations() {
    let backrunner = Arc::new(RecordingBackrunner {
        delay: Duration::from_secs(5),
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(backrunner.clone(), None);

    let (_tx, rx) = idle_shutdown();
    let stats = timeout(
        Duration::from_secs(1),
        dispatcher.run(stream::iter((0..10).map(feed_tx)), rx),
    )
    .await
    .expect("loop returned while invocations were still running");
    assert_eq!(stats.received, 10);
}

#[tokio::test]
async fn test_shutdown_stops_idle_loop() {
    let backrunner = Arc::new(RecordingBackrunner::default());
    let dispatcher = Dispatcher::new(backrunner, None);

    let (feed_tx_sender, feed_rx) = mpsc::unbounded_channel::<ChainTransaction>();
    let (stop, rx) = watch::channel(false);

    let handle = tokio::spawn(async move { dispatcher.run(receiver_stream(feed_rx), rx).await });
    feed_tx_sender.send(feed_tx(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.send_replace(true);

    let stats = timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop stopped")
        .unwrap();
    assert_eq!(stats.received, 1);
    // The feed stays open; only the signal ended the loop
    drop(feed_tx_sender);
}

#[tokio::test]
async fn test_shutdown_already_signalled() {
    let backrunner = Arc::new(RecordingBackrunner::default());
    let dispatcher = Dispatcher::new(backrunner, None);
    let (_stop, rx) = watch::channel(true);

    let stats = timeout(Duration::from_secs(1), dispatcher.run(stream::pending(), rx))
        .await
        .expect("loop stopped");
    assert_eq!(stats.received, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_in_flight_bounds_execution() {
    let backrunner = Arc::new(RecordingBackrunner {
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(backrunner.clone(), Some(3));

    let (_tx, rx) = idle_shutdown();
    dispatcher.run(stream::iter((0..15).map(feed_tx)).boxed(), rx).await;

    backrunner.wait_for(15).await;
    assert!(backrunner.peak_in_flight.load(Ordering::SeqCst) <= 3);
}

/// In-memory sink for formatted log lines
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Logs one line per invocation and reports completion
struct LoggingBackrunner {
    done: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl Backrunner for LoggingBackrunner {
    async fn on_transaction(&self, tx: ChainTransaction) -> BotResult<bool> {
        tracing::info!(tx_hash = tx.hash(), "Evaluating transaction");
        let _ = self.done.send(());
        Ok(false)
    }
}

#[tokio::test]
async fn test_dispatched_tasks_log_service_fields() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (done, mut finished) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(Arc::new(LoggingBackrunner { done }), None);
    let (_stop, rx) = idle_shutdown();
    dispatcher
        .run(stream::iter(vec![feed_tx(1)]), rx)
        .instrument(service_span())
        .await;

    timeout(Duration::from_secs(5), finished.recv())
        .await
        .expect("invocation ran")
        .expect("sender alive");

    let output = String::from_utf8(logs.0.lock().clone()).unwrap();
    let line = output
        .lines()
        .find(|line| line.contains("Evaluating transaction"))
        .expect("backrunner line logged");
    let entry: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(entry["span"]["service"], SERVICE_NAME);
    assert_eq!(entry["span"]["version"], env!("CARGO_PKG_VERSION"));
}
