//! Signing and broadcast behaviour of the transaction builder

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use std::sync::Arc;

use super::test_helpers::*;
use crate::errors::BotError;
use crate::test_utils::MockChainClient;
use crate::types::ContractCall;

fn call() -> ContractCall {
    ContractCall::new(MULTIHOP, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]))
}

#[tokio::test]
async fn test_connect_reads_chain_id() {
    let mock = Arc::new(MockChainClient::new(CHAIN_ID, 0));
    let builder = builder_for(mock).await;
    assert_eq!(builder.chain_id(), CHAIN_ID);
    assert_eq!(builder.operator(), test_key().address());
}

#[tokio::test]
async fn test_connect_fails_when_chain_unreachable() {
    let mock = Arc::new(MockChainClient::new(CHAIN_ID, 0));
    mock.fail_chain_id(true);
    let client: Arc<dyn crate::chain::ChainClient> = mock;
    let err = crate::tx_builder::TxBuilder::connect(client, test_key(), fixed_gas())
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::ChainQuery(_)));
}

#[tokio::test]
async fn test_build_signed_is_deterministic() {
    let builder = builder_for(Arc::new(MockChainClient::new(CHAIN_ID, 0))).await;

    let first = builder.build_signed(&call(), 3, fixed_fees()).await.unwrap();
    let second = builder.build_signed(&call(), 3, fixed_fees()).await.unwrap();

    assert_eq!(first.raw(), second.raw());
    assert_eq!(first.hash(), second.hash());
}

#[tokio::test]
async fn test_signed_transaction_fields() {
    let builder = builder_for(Arc::new(MockChainClient::new(CHAIN_ID, 0))).await;
    let signed = builder
        .build_signed(&call().with_value(U256::from(5u64)), 11, fixed_fees())
        .await
        .unwrap();

    let decoded = TxEnvelope::decode_2718(&mut signed.raw().as_ref()).unwrap();
    assert_eq!(decoded.nonce(), 11);
    assert_eq!(decoded.chain_id(), Some(CHAIN_ID));
    assert_eq!(decoded.kind(), TxKind::Call(MULTIHOP));
    assert_eq!(decoded.input(), &call().input);
    assert_eq!(decoded.value(), U256::from(5u64));
    assert_eq!(decoded.gas_limit(), 900_000);
    assert_eq!(decoded.recover_signer().unwrap(), test_key().address());
    assert_eq!(*decoded.tx_hash(), signed.hash());
}

#[tokio::test]
async fn test_zero_target_rejected() {
    let builder = builder_for(Arc::new(MockChainClient::new(CHAIN_ID, 0))).await;
    let err = builder
        .build_signed(&ContractCall::new(Address::ZERO, Bytes::new()), 0, fixed_fees())
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::ContractCall(_)));
}

#[tokio::test]
async fn test_tip_above_max_fee_rejected() {
    let builder = builder_for(Arc::new(MockChainClient::new(CHAIN_ID, 0))).await;
    let mut fees = fixed_fees();
    fees.max_priority_fee_per_gas = fees.max_fee_per_gas + 1;
    let err = builder.build_signed(&call(), 0, fees).await.unwrap_err();
    assert!(matches!(err, BotError::ContractCall(_)));
}

#[tokio::test]
async fn test_submit_commits_nonce_on_success() {
    let mock = Arc::new(MockChainClient::new(CHAIN_ID, 4).with_static_nonce());
    let builder = builder_for(Arc::clone(&mock)).await;

    let first = builder.submit(call()).await.unwrap();
    let second = builder.submit(call()).await.unwrap();

    assert_eq!(first.nonce(), 4);
    assert_eq!(second.nonce(), 5);
    assert_eq!(builder.nonce_manager().next_local().await, Some(6));
    assert_eq!(mock.broadcasts().len(), 2);
}

#[tokio::test]
async fn test_rejected_broadcast_does_not_advance_nonce() {
    let mock = Arc::new(MockChainClient::new(CHAIN_ID, 4).with_static_nonce());
    let builder = builder_for(Arc::clone(&mock)).await;
    mock.reject_next_broadcasts(1);

    let err = builder.submit(call()).await.unwrap_err();
    assert!(matches!(err, BotError::Submission(_)));
    assert_eq!(builder.nonce_manager().next_local().await, None);

    let retried = builder.submit(call()).await.unwrap();
    assert_eq!(retried.nonce(), 4);
}

#[tokio::test]
async fn test_chain_nonce_ahead_of_cursor_wins() {
    let mock = Arc::new(MockChainClient::new(CHAIN_ID, 0).with_static_nonce());
    let builder = builder_for(Arc::clone(&mock)).await;

    assert_eq!(builder.submit(call()).await.unwrap().nonce(), 0);
    // Another process used the key
    mock.set_nonce(10);
    assert_eq!(builder.submit(call()).await.unwrap().nonce(), 10);
}
