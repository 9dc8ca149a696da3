//! Skipper - backrunning relay bot
//!
//! Watches a chain's mempool, evaluates each transaction as a backrun
//! opportunity against a deployed multihop swap contract, and signs and
//! submits the follow-up transaction when the strategy finds one. An HTTP
//! relay accepts candidate transactions from a frontend, and a withdraw
//! command reclaims the contract's accumulated base-token balance.
//!
//! ## Pipeline
//!
//! ```text
//! PollingFeed ──► Dispatcher ──► Bot ──► TxBuilder ──► ChainClient
//!                     ▲                     ▲
//!   RelayServer ──────┘ (queue policy)      │
//!   withdraw() ─────────────────────────────┘
//! ```
//!
//! Every submission path shares one `NonceManager` per signing key.

pub mod bot;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod dispatch;
pub mod errors;
pub mod feed;
pub mod logging;
pub mod metrics;
pub mod nonce_manager;
pub mod relay;
pub mod tx_builder;
pub mod types;
pub mod wallet;
pub mod withdraw;

pub mod test_utils;

#[cfg(test)]
mod tests;

pub use bot::{Backrunner, Bot, NoopStrategy, Opportunity, Strategy};
pub use chain::{ChainClient, FeeEstimate, RpcChainClient};
pub use config::BotConfig;
pub use dispatch::{DispatchStats, Dispatcher};
pub use errors::{BotError, BotResult};
pub use feed::{PollingFeed, TransactionFeed};
pub use relay::{RelayConfig, RelayServer, RelaySink};
pub use tx_builder::{GasPolicy, TxBuilder};
pub use types::{ChainTransaction, ContractCall, SignedTransaction, TxOrigin};
pub use wallet::OperatorKey;
