//! Gas ceiling and fee policy

use crate::chain::{ChainClient, FeeEstimate};
use crate::config::GasConfig;
use crate::errors::BotResult;

/// Operational gas ceiling applied to every transaction
pub const DEFAULT_GAS_LIMIT: u64 = 900_000;

/// How type-2 fee fields are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Ask the chain (`eth_feeHistory` based estimate) before every submission
    Estimate,
    /// Use the same fee levels every time
    Fixed(FeeEstimate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: u64,
    pub fees: FeePolicy,
}

impl GasPolicy {
    pub fn fixed(gas_limit: u64, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            gas_limit,
            fees: FeePolicy::Fixed(FeeEstimate {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }),
        }
    }

    pub(crate) async fn resolve_fees(&self, client: &dyn ChainClient) -> BotResult<FeeEstimate> {
        match self.fees {
            FeePolicy::Fixed(fees) => Ok(fees),
            FeePolicy::Estimate => client.fee_estimate().await,
        }
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            fees: FeePolicy::Estimate,
        }
    }
}

impl From<&GasConfig> for GasPolicy {
    fn from(config: &GasConfig) -> Self {
        let fees = match (config.max_fee_per_gas, config.max_priority_fee_per_gas) {
            (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => {
                FeePolicy::Fixed(FeeEstimate {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                })
            }
            _ => FeePolicy::Estimate,
        };
        Self {
            gas_limit: config.gas_limit,
            fees,
        }
    }
}
