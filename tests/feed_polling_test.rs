//! Mempool feed against a mock Tendermint RPC

use base64::Engine;
use futures::StreamExt;
use mockito::{Matcher, Server};
use std::time::Duration;
use tokio::time::timeout;

use skipper::feed::{tendermint_tx_hash, PollingFeed, TransactionFeed, DEFAULT_REQUEST_TIMEOUT};
use skipper::{BotError, TxOrigin};

fn polling_feed(rpc: impl Into<String>, poll_ms: u64) -> PollingFeed {
    PollingFeed::new(rpc, Duration::from_millis(poll_ms), DEFAULT_REQUEST_TIMEOUT).unwrap()
}

fn unconfirmed_body(txs: &[&[u8]]) -> String {
    let encoded: Vec<String> = txs
        .iter()
        .map(|raw| base64::engine::general_purpose::STANDARD.encode(raw))
        .collect();
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "n_txs": encoded.len().to_string(),
            "total": encoded.len().to_string(),
            "txs": encoded,
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_poll_once_decodes_snapshot() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/unconfirmed_txs")
        .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(unconfirmed_body(&[b"alpha", b"beta"]))
        .create_async()
        .await;

    let feed = polling_feed(server.url(), 10);
    let txs = feed.poll_once().await.unwrap();

    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].raw().as_ref(), b"alpha");
    assert_eq!(txs[0].hash(), tendermint_tx_hash(b"alpha"));
    assert_eq!(txs[1].origin(), TxOrigin::Feed);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_poll_once_skips_undecodable_entries() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/unconfirmed_txs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"result":{"txs":["YWJj","!!not base64!!"]}}"#)
        .create_async()
        .await;

    let feed = polling_feed(server.url(), 10);
    let txs = feed.poll_once().await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].raw().as_ref(), b"abc");
}

#[tokio::test]
async fn test_poll_once_reports_rpc_errors() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/unconfirmed_txs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"error":{"code":-32603,"message":"internal"}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/down/unconfirmed_txs")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let feed = polling_feed(server.url(), 10);
    assert!(matches!(feed.poll_once().await, Err(BotError::ChainQuery(_))));

    let feed = polling_feed(format!("{}/down", server.url()), 10);
    assert!(matches!(feed.poll_once().await, Err(BotError::ChainQuery(_))));
}

#[tokio::test]
async fn test_subscription_emits_only_new_transactions() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/unconfirmed_txs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(unconfirmed_body(&[b"alpha", b"beta"]))
        .create_async()
        .await;

    let feed = polling_feed(server.url(), 20);
    let mut stream = feed.subscribe();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let tx = timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("feed emitted")
            .expect("stream open");
        seen.push(tx.raw().to_vec());
    }
    assert_eq!(seen, vec![b"alpha".to_vec(), b"beta".to_vec()]);

    // The same snapshot polled again emits nothing
    assert!(timeout(Duration::from_millis(150), stream.next()).await.is_err());

    first.remove_async().await;
    server
        .mock("GET", "/unconfirmed_txs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(unconfirmed_body(&[b"beta", b"gamma"]))
        .create_async()
        .await;

    let next = timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("feed emitted")
        .expect("stream open");
    assert_eq!(next.raw().as_ref(), b"gamma");
    assert!(timeout(Duration::from_millis(150), stream.next()).await.is_err());
}

#[tokio::test]
async fn test_subscriptions_are_independent() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/unconfirmed_txs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(unconfirmed_body(&[b"alpha"]))
        .create_async()
        .await;

    let feed = polling_feed(server.url(), 20);
    let mut a = feed.subscribe();
    let mut b = feed.subscribe();

    let from_a = timeout(Duration::from_secs(5), a.next()).await.unwrap().unwrap();
    let from_b = timeout(Duration::from_secs(5), b.next()).await.unwrap().unwrap();
    assert_eq!(from_a, from_b);
}
