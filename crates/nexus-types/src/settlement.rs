//! On-chain settlement seam for the payment executor.
//!
//! The executor never talks to a chain directly. It looks the chain up in a
//! [`SettlementRegistry`] built at startup; a chain with no entry runs in demo
//! mode. Chain crates implement [`NativeSettlement`] for their providers.

use alloy_primitives::{Address, TxHash};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::ChainId;
use crate::util::WeiAmount;

/// Errors surfaced by an on-chain native transfer.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Settlement did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Transaction {0} reverted")]
    Reverted(TxHash),
    #[error("Transaction submission failed: {0}")]
    Submission(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Transaction confirmation failed: {0}")]
    Confirmation(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    /// Hash of the transaction that reached the chain, if any.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            SettlementError::Reverted(tx_hash) => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Sends native currency from the operator's signing wallet.
///
/// Implementations must only return `Ok` once the transfer is confirmed on
/// chain with a successful status.
#[async_trait::async_trait]
pub trait NativeSettlement: Send + Sync {
    /// Chain this settlement backend submits to.
    fn chain_id(&self) -> ChainId;

    /// Address the transfers are sent from.
    fn signer_address(&self) -> Address;

    /// Transfers `amount` to `to` and waits for confirmation.
    async fn transfer_native(&self, to: Address, amount: WeiAmount)
    -> Result<TxHash, SettlementError>;
}

/// Settlement backends indexed by chain id.
#[derive(Clone, Default)]
pub struct SettlementRegistry(HashMap<ChainId, Arc<dyn NativeSettlement>>);

impl SettlementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under its own chain id, replacing any previous one.
    pub fn and_register(mut self, settlement: Arc<dyn NativeSettlement>) -> Self {
        self.0.insert(settlement.chain_id(), settlement);
        self
    }

    pub fn by_chain_id(&self, chain_id: ChainId) -> Option<&Arc<dyn NativeSettlement>> {
        self.0.get(&chain_id)
    }

    /// `true` when no chain can settle on-chain.
    pub fn is_demo_mode(&self) -> bool {
        self.0.is_empty()
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.0.keys().copied()
    }
}

impl std::fmt::Debug for SettlementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chains: Vec<_> = self.0.keys().collect();
        chains.sort();
        f.debug_tuple("SettlementRegistry").field(&chains).finish()
    }
}
