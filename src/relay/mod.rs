//! Relay API
//!
//! HTTP ingress for candidate transactions submitted by the frontend.
//!
//! ## Lifecycle
//!
//! `Created → Started → Stopped`, held in a single atomic:
//! - `start()` is one compare-and-swap `Created → Started`; every later or
//!   concurrent call fails with `ServerLifecycle` before touching the network
//! - `stop()` swaps in `Stopped`; only the caller that observed `Started`
//!   shuts the server down, every other call is a successful no-op
//! - `Stopped` is terminal, so a stopped server can never be started
//!
//! ## Shutdown
//!
//! Every accepted connection runs as its own task in a [`JoinSet`] owned by
//! the accept loop. On `stop()` the loop drops the listener and asks each
//! connection to finish its current request. Connections still open when
//! `shutdown_grace` runs out are aborted, which drops their in-flight
//! handlers. `stop()` returns only after every connection task has ended.

mod handlers;
mod response;
mod sink;

pub use response::{respond, respond_error, respond_msg, respond_ok, HttpErrorResp, HttpMessageResp};
pub use sink::{decode_relayed, sink_for_policy, AcknowledgeSink, EvaluateSink, QueueSink, RelaySink};

use axum::routing::{get, post};
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, info, warn, Instrument};

use crate::config::BotConfig;
use crate::errors::{BotError, BotResult};

pub const PATH_TRANSACTION: &str = "/transaction";
pub const PATH_HEALTH: &str = "/health";
pub const PATH_METRICS: &str = "/metrics";

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: String,
    /// How long `stop()` waits for in-flight requests before aborting
    pub shutdown_grace: Duration,
}

impl From<&BotConfig> for RelayConfig {
    fn from(config: &BotConfig) -> Self {
        Self {
            listen_addr: config.api_host.clone(),
            shutdown_grace: Duration::from_millis(config.relay.shutdown_grace_ms),
        }
    }
}

/// Server lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Created = 0,
    Started = 1,
    Stopped = 2,
}

impl From<u8> for ServerState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Started,
            _ => Self::Stopped,
        }
    }
}

/// Shared handler state
pub(crate) struct RelayState {
    sink: Arc<dyn RelaySink>,
    started_at: Instant,
    requests: AtomicU64,
}

/// Router with every relay route
pub fn router(sink: Arc<dyn RelaySink>) -> Router {
    let state = Arc::new(RelayState {
        sink,
        started_at: Instant::now(),
        requests: AtomicU64::new(0),
    });
    Router::new()
        .route(PATH_TRANSACTION, post(handlers::transaction))
        .route(PATH_HEALTH, get(handlers::health))
        .route(PATH_METRICS, get(handlers::metrics_text))
        .fallback(handlers::not_found)
        .with_state(state)
}

pub struct RelayServer {
    config: RelayConfig,
    sink: Arc<dyn RelaySink>,
    state: AtomicU8,
    drain: CancellationToken,
    /// Held by `start()` until the server task is stored
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, sink: Arc<dyn RelaySink>) -> Self {
        Self {
            config,
            sink,
            state: AtomicU8::new(ServerState::Created as u8),
            drain: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::Acquire))
    }

    /// Bind the listener and serve in the background
    ///
    /// Returns the bound address. Succeeds at most once per instance. A
    /// `stop()` that lands while this is binding waits for it, then tears
    /// the listener down before returning.
    pub async fn start(&self) -> BotResult<SocketAddr> {
        let mut task = self.task.lock().await;

        self.state
            .compare_exchange(
                ServerState::Created as u8,
                ServerState::Started as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| BotError::already_started())?;

        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|e| {
                BotError::ServerLifecycle(format!("bind {}: {}", self.config.listen_addr, e))
            })?;
        let local_addr = listener.local_addr().map_err(|e| {
            BotError::ServerLifecycle(format!("listener address: {}", e))
        })?;

        let app = router(Arc::clone(&self.sink));
        let handle = tokio::spawn(
            accept_loop(listener, app, self.drain.clone(), self.config.shutdown_grace)
                .in_current_span(),
        );
        *task = Some(handle);

        if self.state() == ServerState::Stopped {
            debug!(address = %local_addr, "Relay stopped while starting");
            return Err(BotError::ServerLifecycle(
                "relay server stopped during start".to_string(),
            ));
        }

        info!(address = %local_addr, "Relay API listening");
        Ok(local_addr)
    }

    /// Stop accepting requests and drain in-flight ones
    ///
    /// Idempotent. In-flight requests get `shutdown_grace` to finish; their
    /// connections are aborted after that.
    pub async fn stop(&self) -> BotResult<()> {
        let previous = ServerState::from(
            self.state
                .swap(ServerState::Stopped as u8, Ordering::AcqRel),
        );
        match previous {
            ServerState::Stopped => return Ok(()),
            ServerState::Created => {
                debug!("Relay stopped before start");
                return Ok(());
            }
            ServerState::Started => {}
        }

        self.drain.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(()) => info!("Relay API stopped"),
                Err(e) => warn!(error = %e, "Relay server task ended abnormally"),
            }
        }
        Ok(())
    }
}

/// Accept connections until `drain` fires, then wait out `grace`
async fn accept_loop(
    listener: TcpListener,
    app: Router,
    drain: CancellationToken,
    grace: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = drain.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(
                        serve_connection(stream, peer, app.clone(), drain.clone())
                            .in_current_span(),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Relay accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);

    debug!(open = connections.len(), "Relay draining connections");
    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            grace_ms = grace.as_millis() as u64,
            open = connections.len(),
            "Grace period elapsed, aborting relay connections"
        );
        connections.shutdown().await;
    }
}

/// Serve HTTP/1 requests on one connection
///
/// Once `drain` fires the connection finishes the request in progress and
/// closes.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, app: Router, drain: CancellationToken) {
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        app.clone().oneshot(request)
    });
    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), service);
    let mut connection = std::pin::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = drain.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };
    if let Err(e) = result {
        debug!(%peer, error = %e, "Relay connection closed with error");
    }
}
