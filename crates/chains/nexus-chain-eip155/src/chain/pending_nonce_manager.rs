use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A nonce manager that caches nonces locally and checks pending transactions on first use.
///
/// Concurrent `/pay` requests settle from the same operator wallet, so nonces
/// are allocated locally under a per-address lock instead of being fetched for
/// every transaction.
///
/// - **First call for an address**: fetches the nonce with `.pending()`, which
///   includes mempool transactions, so a restart with settlements in flight
///   does not reuse a nonce.
/// - **Subsequent calls**: increments the cached nonce.
/// - **After a failure**: [`PendingNonceManager::reset_nonce`] forces a fresh query.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

/// Marks an address whose nonce has not been fetched yet.
const NONE: u64 = u64::MAX;

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: alloy_network::Network,
    {
        // Clone the Arc out so the dashmap shard is not held across the await.
        let nonce = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONE)));
            Arc::clone(entry.value())
        };

        let mut nonce = nonce.lock().await;
        let new_nonce = if *nonce == NONE {
            tracing::trace!(%address, "fetching nonce");
            provider.get_transaction_count(address).pending().await?
        } else {
            tracing::trace!(%address, current_nonce = *nonce, "incrementing nonce");
            *nonce + 1
        };
        *nonce = new_nonce;
        Ok(new_nonce)
    }
}

impl PendingNonceManager {
    /// Forgets the cached nonce for `address`; the next allocation re-queries the RPC.
    ///
    /// Called whenever submission or confirmation fails, since the transaction
    /// may or may not have reached the mempool.
    pub async fn reset_nonce(&self, address: Address) {
        let nonce_lock = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()));
        if let Some(nonce_lock) = nonce_lock {
            let mut nonce = nonce_lock.lock().await;
            *nonce = NONE;
            tracing::debug!(%address, "reset nonce cache, will requery on next use");
        }
    }

    /// Returns the last allocated nonce, if one is cached.
    pub async fn cached_nonce(&self, address: Address) -> Option<u64> {
        let nonce_lock = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()))?;
        let nonce = *nonce_lock.lock().await;
        (nonce != NONE).then_some(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_unknown_address_is_noop() {
        let manager = PendingNonceManager::default();
        manager.reset_nonce(Address::ZERO).await;
        assert_eq!(manager.cached_nonce(Address::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_reset_clears_cached_nonce() {
        let manager = PendingNonceManager::default();
        manager
            .nonces
            .insert(Address::ZERO, Arc::new(Mutex::new(7)));
        assert_eq!(manager.cached_nonce(Address::ZERO).await, Some(7));
        manager.reset_nonce(Address::ZERO).await;
        assert_eq!(manager.cached_nonce(Address::ZERO).await, None);
    }
}
