//! Error types for the backrunning relay bot
//!
//! One taxonomy covers every stage of the pipeline so callers can decide
//! between retrying, reporting and aborting:
//! - Startup: configuration and key material (fatal)
//! - Chain access: nonce / chain-ID lookups (retryable)
//! - Construction: calldata encoding and signing (not retryable as-is)
//! - Broadcast: network rejection (retryable with a fresh nonce)
//! - Relay: lifecycle misuse and bad client input

use thiserror::Error;

/// Errors produced by the bot, the signer and the relay
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed signing key
    #[error("Key error: {0}")]
    Key(String),

    /// Nonce or chain-ID retrieval failed
    #[error("Chain query failed: {0}")]
    ChainQuery(String),

    /// The contract call could not be encoded or the transaction could not
    /// be constructed and signed
    #[error("Contract call error: {0}")]
    ContractCall(String),

    /// The network rejected the broadcast
    ///
    /// Distinct from construction failures: this one may be retried after
    /// reading a fresh nonce.
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// Relay server started twice or otherwise misused
    #[error("Server lifecycle error: {0}")]
    ServerLifecycle(String),

    /// Bad client input to the relay
    #[error("Invalid request: {0}")]
    RequestValidation(String),
}

pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    /// Whether retrying the same operation (with a fresh nonce read) may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ChainQuery(_) | Self::Submission(_) => true,
            Self::Config(_)
            | Self::Key(_)
            | Self::ContractCall(_)
            | Self::ServerLifecycle(_)
            | Self::RequestValidation(_) => false,
        }
    }

    /// Error category for metrics labels and structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Key(_) => "key",
            Self::ChainQuery(_) => "chain_query",
            Self::ContractCall(_) => "contract_call",
            Self::Submission(_) => "submission",
            Self::ServerLifecycle(_) => "server_lifecycle",
            Self::RequestValidation(_) => "request_validation",
        }
    }

    pub fn already_started() -> Self {
        Self::ServerLifecycle("server was already started".to_string())
    }

    pub fn chain_query(reason: impl std::fmt::Display) -> Self {
        Self::ChainQuery(reason.to_string())
    }

    pub fn contract_call(reason: impl std::fmt::Display) -> Self {
        Self::ContractCall(reason.to_string())
    }

    pub fn submission(reason: impl std::fmt::Display) -> Self {
        Self::Submission(reason.to_string())
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::RequestValidation(reason.into())
    }
}
