//! Payment challenges and proofs exchanged with x402 resource servers.
//!
//! A resource server that wants payment answers `402 Payment Required` with
//! its terms in headers:
//!
//! ```text
//! X-Cronos-Address: 0x742d35Cc6634C0532925a3b844Bc9e7595f5e123
//! X-Cost: 100000000000000000
//! X-Asset-Type: native
//! X-Chain-Id: 240
//! ```
//!
//! The client pays and retries with `X-PAYMENT: <txHash>:<chainId>`.

use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chain::ChainId;
use crate::util::WeiAmount;

pub const PAYEE_HEADER: &str = "x-cronos-address";
pub const COST_HEADER: &str = "x-cost";
pub const ASSET_TYPE_HEADER: &str = "x-asset-type";
pub const CHAIN_ID_HEADER: &str = "x-chain-id";
pub const PAYMENT_HEADER: &str = "x-payment";

/// The only asset type Nexus settles.
pub const NATIVE_ASSET: &str = "native";

/// Payment terms parsed from a single `402` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub payee: Address,
    pub cost: WeiAmount,
    pub asset_type: String,
    pub chain_id: ChainId,
}

impl PaymentChallenge {
    pub fn is_native(&self) -> bool {
        self.asset_type.eq_ignore_ascii_case(NATIVE_ASSET)
    }
}

/// Proof-of-payment token sent in the `X-PAYMENT` header: `<txHash>:<chainId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentProof {
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
}

impl fmt::Display for PaymentProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.chain_id)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid payment proof {0}: expected <txHash>:<chainId>")]
pub struct PaymentProofParseError(String);

impl FromStr for PaymentProof {
    type Err = PaymentProofParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx_hash, chain_id) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| PaymentProofParseError(s.to_string()))?;
        let tx_hash = TxHash::from_str(tx_hash).map_err(|_| PaymentProofParseError(s.to_string()))?;
        let chain_id =
            ChainId::from_str(chain_id).map_err(|_| PaymentProofParseError(s.to_string()))?;
        Ok(PaymentProof { tx_hash, chain_id })
    }
}
