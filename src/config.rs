//! Configuration module for the backrunning bot
//!
//! Configuration lives in a directory (`<dir>/config.toml`), with an optional
//! `.env` file and `SKIPPER_*` environment variables layered on top. The
//! resulting [`BotConfig`] is read-only for the rest of the process.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{BotError, BotResult};

/// Name of the configuration file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// JSON-RPC endpoint of the EVM side of the chain
    pub eth_rpc: String,

    /// Tendermint RPC endpoint polled for unconfirmed transactions
    pub cosmos_rpc: String,

    /// Feed poll interval in milliseconds
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Upper bound on a single feed poll, connect included
    #[serde(default = "default_feed_timeout_ms")]
    pub feed_timeout_ms: u64,

    /// Relay HTTP listen address
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Token reclaimed by the withdraw command
    pub base_token: Address,

    #[serde(default)]
    pub gas: GasConfig,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Fixed operational gas ceiling for every transaction
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Fixed max fee per gas (wei); when unset, fees are estimated from the chain
    #[serde(default)]
    pub max_fee_per_gas: Option<u128>,

    /// Fixed priority fee per gas (wei); must be set together with `max_fee_per_gas`
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<u128>,
}

/// How the relay handles accepted transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForwardPolicy {
    /// Acknowledge receipt only
    #[default]
    Acknowledge,
    /// Evaluate immediately on the request path
    Evaluate,
    /// Queue into the dispatch loop
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub forward_policy: ForwardPolicy,

    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on concurrently executing backrun evaluations
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `json` or `text`
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_poll_ms() -> u64 { 500 }
fn default_feed_timeout_ms() -> u64 { 5_000 }
fn default_api_host() -> String { "0.0.0.0:8080".to_string() }
fn default_gas_limit() -> u64 { 900_000 }
fn default_shutdown_grace_ms() -> u64 { 5_000 }
fn default_log_format() -> String { "json".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            forward_policy: ForwardPolicy::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_in_flight: None }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

impl BotConfig {
    /// Load `<dir>/config.toml`, apply environment overrides and validate
    pub fn load(dir: impl AsRef<Path>) -> BotResult<Self> {
        let dir = dir.as_ref();
        match dotenvy::from_path(dir.join(".env")) {
            Ok(()) => {}
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(BotError::Config(format!(
                    "failed to load {}: {}",
                    dir.join(".env").display(),
                    e
                )))
            }
        }

        let path = dir.join(CONFIG_FILE_NAME);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            BotError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without validation
    pub fn from_toml_str(content: &str) -> BotResult<Self> {
        toml::from_str(content).map_err(|e| BotError::Config(format!("invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SKIPPER_ETH_RPC") {
            self.eth_rpc = v;
        }
        if let Ok(v) = std::env::var("SKIPPER_COSMOS_RPC") {
            self.cosmos_rpc = v;
        }
        if let Ok(v) = std::env::var("SKIPPER_API_HOST") {
            self.api_host = v;
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> BotResult<()> {
        if self.eth_rpc.trim().is_empty() {
            return Err(BotError::Config("eth_rpc must not be empty".to_string()));
        }
        if self.cosmos_rpc.trim().is_empty() {
            return Err(BotError::Config("cosmos_rpc must not be empty".to_string()));
        }
        if self.poll_ms == 0 {
            return Err(BotError::Config("poll_ms must be greater than zero".to_string()));
        }
        if self.feed_timeout_ms == 0 {
            return Err(BotError::Config(
                "feed_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.gas.gas_limit == 0 {
            return Err(BotError::Config("gas.gas_limit must be greater than zero".to_string()));
        }
        match (self.gas.max_fee_per_gas, self.gas.max_priority_fee_per_gas) {
            (Some(max_fee), Some(tip)) if tip > max_fee => {
                return Err(BotError::Config(format!(
                    "gas.max_priority_fee_per_gas ({}) exceeds gas.max_fee_per_gas ({})",
                    tip, max_fee
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(BotError::Config(
                    "gas.max_fee_per_gas and gas.max_priority_fee_per_gas must be set together"
                        .to_string(),
                ));
            }
            _ => {}
        }
        if self.dispatch.max_in_flight == Some(0) {
            return Err(BotError::Config(
                "dispatch.max_in_flight must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}
