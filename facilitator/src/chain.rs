//! Settlement providers and ledger backend for the configured chains.
//!
//! With a signing key every supported chain gets an
//! [`Eip155ChainProvider`] that sends native transfers from the master wallet.
//! Without one the [`SettlementRegistry`] stays empty and payments are
//! simulated (demo mode).

use nexus_chain_eip155::chain::{Eip155ChainConfig, Eip155ChainProvider};
use nexus_facilitator_local::ledger::{LedgerStore, MemoryLedger};
use nexus_types::chain::{ChainRegistry, FromConfig};
use nexus_types::settlement::SettlementRegistry;
use std::sync::Arc;

use crate::config::Config;

/// Connections kept by the Postgres ledger pool.
#[cfg(feature = "postgres")]
const DATABASE_MAX_CONNECTIONS: u32 = 10;

#[cfg(not(feature = "postgres"))]
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("DATABASE_URL is set but this build has no Postgres support (enable the `postgres` feature)")]
    PostgresDisabled,
}

/// Builds one settlement provider per supported chain.
///
/// # Errors
///
/// Returns an error if the signing key is malformed or a provider fails to
/// initialize.
pub async fn settlement_registry(
    chains: &ChainRegistry,
    config: &Config,
) -> Result<SettlementRegistry, Box<dyn std::error::Error>> {
    let mut registry = SettlementRegistry::new();
    let Some(signer) = config.signer()? else {
        tracing::warn!("No MASTER_WALLET_PRIVATE_KEY configured, payments will be simulated");
        return Ok(registry);
    };
    for chain in chains.iter() {
        let eip1559 = config
            .chains()
            .get(&chain.chain_id)
            .and_then(|o| o.eip1559)
            .unwrap_or(true);
        let chain_config = Eip155ChainConfig::new(chain.clone(), signer)
            .with_eip1559(eip1559)
            .with_receipt_timeout_secs(config.receipt_timeout_secs());
        let provider = Eip155ChainProvider::from_config(&chain_config).await?;
        registry = registry.and_register(Arc::new(provider));
    }
    Ok(registry)
}

/// Picks the ledger backend: Postgres when a database URL is configured,
/// in-memory otherwise.
pub async fn ledger_store(
    config: &Config,
) -> Result<Arc<dyn LedgerStore>, Box<dyn std::error::Error>> {
    match config.database_url() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let ledger = nexus_facilitator_local::ledger::PostgresLedger::connect(
                &url,
                DATABASE_MAX_CONNECTIONS,
            )
            .await?;
            tracing::info!("Using Postgres ledger");
            Ok(Arc::new(ledger))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => Err(BackendError::PostgresDisabled.into()),
        None => {
            tracing::info!("Using in-memory ledger, balances are lost on restart");
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}
