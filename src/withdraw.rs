//! Withdraw flow
//!
//! One-shot operator command: reclaim the accumulated balance of a token
//! from the multihop contract. Runs through the same [`TxBuilder`] (and
//! therefore the same nonce serialization) as backrun submissions.

use alloy::primitives::{Address, TxHash};
use tracing::info;

use crate::contracts::withdraw_calldata;
use crate::errors::BotResult;
use crate::tx_builder::TxBuilder;
use crate::types::{ContractCall, SignedTransaction};

/// Block explorer used when reporting withdraw transactions
pub const EXPLORER_TX_URL: &str = "https://escan.live/tx/";

/// Sign and broadcast `withdraw(token)` on the multihop contract
///
/// Single attempt; any failure is returned to the operator as-is.
pub async fn withdraw(
    builder: &TxBuilder,
    multihop: Address,
    token: Address,
) -> BotResult<SignedTransaction> {
    info!(%multihop, %token, operator = %builder.operator(), "Submitting withdraw");
    let call = ContractCall::new(multihop, withdraw_calldata(token));
    builder.submit(call).await
}

/// Explorer link for a transaction hash
pub fn explorer_link(hash: TxHash) -> String {
    format!("{}{}", EXPLORER_TX_URL, hash)
}
