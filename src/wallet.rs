//! Operator key management
//!
//! The private key arrives as a hex string on the command line. It is parsed
//! exactly once into an [`OperatorKey`]; the string itself is wiped and never
//! kept around.

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::errors::{BotError, BotResult};

/// Opaque handle to the operator's signing key
#[derive(Clone)]
pub struct OperatorKey {
    signer: PrivateKeySigner,
}

impl OperatorKey {
    /// Parse a hex-encoded secp256k1 private key (with or without `0x`)
    pub fn from_hex(hex_key: &str) -> BotResult<Self> {
        let trimmed = Zeroizing::new(hex_key.trim().to_string());
        let clean = trimmed.strip_prefix("0x").unwrap_or(&trimmed);

        if clean.len() != 64 {
            return Err(BotError::Key(format!(
                "expected 64 hex characters, got {}",
                clean.len()
            )));
        }
        if clean.chars().all(|c| c == '0') {
            return Err(BotError::Key("all-zero key rejected".to_string()));
        }

        let signer = PrivateKeySigner::from_str(clean)
            .map_err(|e| BotError::Key(format!("invalid private key: {}", e)))?;
        Ok(Self { signer })
    }

    /// Account address derived from the key
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Wallet used by the transaction builder to sign requests
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
