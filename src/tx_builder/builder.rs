//! Core transaction building logic

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::gas::GasPolicy;
use crate::chain::{ChainClient, FeeEstimate};
use crate::errors::{BotError, BotResult};
use crate::nonce_manager::NonceManager;
use crate::types::{ContractCall, SignedTransaction};
use crate::wallet::OperatorKey;

/// Builds, signs and broadcasts contract calls for one operator key
///
/// Cheap to share behind an `Arc`; all submissions from the same key go
/// through the same [`NonceManager`].
pub struct TxBuilder {
    client: Arc<dyn ChainClient>,
    key: OperatorKey,
    wallet: EthereumWallet,
    chain_id: u64,
    gas: GasPolicy,
    nonces: Arc<NonceManager>,
}

impl TxBuilder {
    /// Resolve the chain ID and prepare the signer
    pub async fn connect(
        client: Arc<dyn ChainClient>,
        key: OperatorKey,
        gas: GasPolicy,
    ) -> BotResult<Self> {
        let chain_id = client.chain_id().await?;
        let nonces = Arc::new(NonceManager::new(key.address()));
        info!(chain_id, operator = %key.address(), gas_limit = gas.gas_limit, "Transaction builder ready");
        Ok(Self::with_nonce_manager(client, key, gas, chain_id, nonces))
    }

    /// Build with an explicit chain ID and a shared nonce manager
    pub fn with_nonce_manager(
        client: Arc<dyn ChainClient>,
        key: OperatorKey,
        gas: GasPolicy,
        chain_id: u64,
        nonces: Arc<NonceManager>,
    ) -> Self {
        let wallet = key.wallet();
        Self {
            client,
            key,
            wallet,
            chain_id,
            gas,
            nonces,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn operator(&self) -> Address {
        self.key.address()
    }

    pub fn gas_policy(&self) -> GasPolicy {
        self.gas
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub fn nonce_manager(&self) -> &Arc<NonceManager> {
        &self.nonces
    }

    /// Build and sign a type-2 transaction without broadcasting it
    pub async fn build_signed(
        &self,
        call: &ContractCall,
        nonce: u64,
        fees: FeeEstimate,
    ) -> BotResult<SignedTransaction> {
        if call.to == Address::ZERO {
            return Err(BotError::contract_call("target contract address is zero"));
        }
        if fees.max_priority_fee_per_gas > fees.max_fee_per_gas {
            return Err(BotError::contract_call(format!(
                "priority fee {} exceeds max fee {}",
                fees.max_priority_fee_per_gas, fees.max_fee_per_gas
            )));
        }

        let request = TransactionRequest::default()
            .with_from(self.key.address())
            .with_to(call.to)
            .with_input(call.input.clone())
            .with_value(call.value)
            .with_chain_id(self.chain_id)
            .with_nonce(nonce)
            .with_gas_limit(self.gas.gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        let envelope: TxEnvelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| BotError::contract_call(format!("signing failed: {}", e)))?;

        let raw = Bytes::from(envelope.encoded_2718());
        let hash = *envelope.tx_hash();
        debug!(%hash, nonce, to = %call.to, "Transaction signed");

        Ok(SignedTransaction::new(hash, nonce, self.chain_id, raw, envelope))
    }

    /// Sign `call` with a freshly leased nonce and broadcast it once
    ///
    /// No retry happens here; a retry needs a new nonce lease, which is the
    /// caller's decision.
    pub async fn submit(&self, call: ContractCall) -> BotResult<SignedTransaction> {
        let started = Instant::now();
        let lease = self.nonces.acquire(self.client.as_ref()).await?;
        let fees = self.gas.resolve_fees(self.client.as_ref()).await?;
        let signed = self.build_signed(&call, lease.nonce(), fees).await?;

        match self.client.send_raw_transaction(signed.raw()).await {
            Ok(remote_hash) => {
                if remote_hash != signed.hash() {
                    warn!(local = %signed.hash(), remote = %remote_hash, "Node reported a different transaction hash");
                }
                lease.commit();
                crate::metrics::metrics()
                    .submit_latency
                    .observe(started.elapsed().as_secs_f64());
                info!(hash = %signed.hash(), nonce = signed.nonce(), to = %call.to, "Transaction broadcast");
                Ok(signed)
            }
            Err(e) => {
                warn!(nonce = signed.nonce(), error = %e, "Broadcast rejected");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for TxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxBuilder")
            .field("operator", &self.key.address())
            .field("chain_id", &self.chain_id)
            .field("gas", &self.gas)
            .finish()
    }
}
