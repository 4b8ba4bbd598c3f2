//! Binding to the `NexusRegistry` contract.

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_sol_types::sol;
use nexus_chain_eip155::chain::rpc_client;
use nexus_types::chain::ChainConfig;

use crate::registry::{RegistryError, RegistrySource, ServiceDetails, ServiceListing};

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface INexusRegistry {
        function getServicesByCategory(string category) external view returns (address[] providers, uint256[] prices, uint256[] reputations);
        function getServiceDetails(address provider) external view returns (string endpoint, uint256 priceInWei, string category, uint256 reputation, uint256 totalCalls, bool active);
    }
}

/// [`RegistrySource`] backed by a deployed `NexusRegistry` contract.
pub struct OnChainRegistry<P> {
    contract: INexusRegistry::INexusRegistryInstance<P>,
}

impl<P: Provider> OnChainRegistry<P> {
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            contract: INexusRegistry::new(address, provider),
        }
    }

    pub fn address(&self) -> Address {
        *self.contract.address()
    }
}

impl OnChainRegistry<RootProvider> {
    /// Read-only connection to the registry at `address` on `chain`.
    pub fn connect(address: Address, chain: &ChainConfig) -> Result<Self, RegistryError> {
        let client = rpc_client(chain.chain_id, std::slice::from_ref(&chain.rpc))
            .map_err(|e| RegistryError::Connection(e.to_string()))?;
        let provider: RootProvider = ProviderBuilder::default().connect_client(client);
        Ok(Self::new(address, provider))
    }
}

#[async_trait::async_trait]
impl<P: Provider + 'static> RegistrySource for OnChainRegistry<P> {
    async fn services_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<ServiceListing>, RegistryError> {
        let response = self
            .contract
            .getServicesByCategory(category.to_string())
            .call()
            .await
            .map_err(|e| RegistryError::Contract(e.to_string()))?;
        if response.providers.len() != response.prices.len()
            || response.providers.len() != response.reputations.len()
        {
            return Err(RegistryError::MalformedResponse(format!(
                "{} providers, {} prices, {} reputations",
                response.providers.len(),
                response.prices.len(),
                response.reputations.len()
            )));
        }
        let listings = response
            .providers
            .into_iter()
            .zip(response.prices)
            .zip(response.reputations)
            .map(|((provider, price), reputation)| ServiceListing {
                provider,
                price: price.into(),
                reputation: saturating_u64(reputation),
            })
            .collect();
        Ok(listings)
    }

    async fn service_details(&self, provider: Address) -> Result<ServiceDetails, RegistryError> {
        let details = self
            .contract
            .getServiceDetails(provider)
            .call()
            .await
            .map_err(|e| RegistryError::Contract(e.to_string()))?;
        Ok(ServiceDetails {
            endpoint: details.endpoint,
            price: details.priceInWei.into(),
            category: details.category,
            reputation: saturating_u64(details.reputation),
            total_calls: saturating_u64(details.totalCalls),
            active: details.active,
        })
    }
}

fn saturating_u64(value: U256) -> u64 {
    value.saturating_to::<u64>()
}
