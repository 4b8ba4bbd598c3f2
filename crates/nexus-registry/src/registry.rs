use alloy_primitives::Address;
use futures_util::future::try_join_all;
use nexus_types::chain::{ChainConfig, ChainId};
use nexus_types::util::WeiAmount;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::catalog;
use crate::contract::OnChainRegistry;
use crate::offering::{FallbackReason, ServiceDiscovery, ServiceOffering, ServiceQuery};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry contract call failed: {0}")]
    Contract(String),
    #[error("Malformed registry response: {0}")]
    MalformedResponse(String),
    #[error("Cannot connect to registry: {0}")]
    Connection(String),
}

/// One row of `getServicesByCategory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceListing {
    pub provider: Address,
    pub price: WeiAmount,
    pub reputation: u64,
}

/// Result of `getServiceDetails` for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetails {
    pub endpoint: String,
    pub price: WeiAmount,
    pub category: String,
    pub reputation: u64,
    pub total_calls: u64,
    pub active: bool,
}

/// Read access to a provider registry.
#[async_trait::async_trait]
pub trait RegistrySource: Send + Sync {
    async fn services_by_category(&self, category: &str)
    -> Result<Vec<ServiceListing>, RegistryError>;

    async fn service_details(&self, provider: Address) -> Result<ServiceDetails, RegistryError>;
}

/// Registry sources keyed by the chain they are deployed on.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    sources: HashMap<ChainId, Arc<dyn RegistrySource>>,
}

impl Debug for ServiceRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut chains: Vec<&ChainId> = self.sources.keys().collect();
        chains.sort();
        f.debug_struct("ServiceRegistry")
            .field("chains", &chains)
            .finish()
    }
}

impl ServiceRegistry {
    /// A registry with no sources. Every lookup is served from the catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_register(mut self, chain_id: ChainId, source: Arc<dyn RegistrySource>) -> Self {
        self.sources.insert(chain_id, source);
        self
    }

    /// Connects to the contract at `address` on each of `chains`.
    pub fn connect<'a>(
        address: Address,
        chains: impl IntoIterator<Item = &'a ChainConfig>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for chain in chains {
            let source = OnChainRegistry::connect(address, chain)?;
            tracing::info!(chain = %chain.chain_id, %address, "Registry source attached");
            registry = registry.and_register(chain.chain_id, Arc::new(source));
        }
        Ok(registry)
    }

    pub fn is_configured(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Offerings in `query.category` priced at or below `query.max_price`,
    /// highest reputation first.
    pub async fn find_services(&self, query: &ServiceQuery) -> ServiceDiscovery {
        if self.sources.is_empty() {
            return fallback(query, FallbackReason::NoRegistryConfigured);
        }
        let Some(source) = self.sources.get(&query.chain_id) else {
            return fallback(query, FallbackReason::ChainUnsupported(query.chain_id));
        };
        match lookup(source.as_ref(), query).await {
            Ok(services) => ServiceDiscovery::live(services),
            Err(e) => {
                tracing::warn!(
                    chain = %query.chain_id,
                    category = %query.category,
                    error = %e,
                    "Registry lookup failed, serving built-in catalog"
                );
                fallback(query, FallbackReason::LookupFailed(e.to_string()))
            }
        }
    }
}

async fn lookup(
    source: &dyn RegistrySource,
    query: &ServiceQuery,
) -> Result<Vec<ServiceOffering>, RegistryError> {
    let listings: Vec<ServiceListing> = source
        .services_by_category(&query.category)
        .await?
        .into_iter()
        .filter(|listing| listing.price <= query.max_price)
        .collect();
    let details = try_join_all(
        listings
            .iter()
            .map(|listing| source.service_details(listing.provider)),
    )
    .await?;
    let offerings = listings
        .into_iter()
        .zip(details)
        .filter(|(_, details)| details.active)
        .map(|(listing, details)| ServiceOffering {
            provider_address: listing.provider,
            endpoint: details.endpoint,
            price_wei: listing.price,
            price_formatted: listing.price.format_ether(),
            category: details.category,
            reputation_score: listing.reputation,
            total_calls: details.total_calls,
            active: details.active,
        })
        .collect();
    Ok(rank(offerings))
}

fn fallback(query: &ServiceQuery, reason: FallbackReason) -> ServiceDiscovery {
    let services = catalog::offerings(&query.category)
        .into_iter()
        .filter(|offering| offering.price_wei <= query.max_price)
        .collect();
    ServiceDiscovery::fallback(rank(services), reason)
}

/// Stable sort by reputation, descending.
fn rank(mut offerings: Vec<ServiceOffering>) -> Vec<ServiceOffering> {
    offerings.sort_by(|a, b| b.reputation_score.cmp(&a.reputation_score));
    offerings
}
