use alloy_primitives::Address;
use nexus_types::chain::ChainId;
use nexus_types::networks::DEFAULT_CHAIN;
use nexus_types::util::WeiAmount;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Category searched when none is given.
pub const DEFAULT_CATEGORY: &str = "news";

/// A priced provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOffering {
    pub provider_address: Address,
    pub endpoint: String,
    pub price_wei: WeiAmount,
    pub price_formatted: String,
    pub category: String,
    pub reputation_score: u64,
    pub total_calls: u64,
    pub active: bool,
}

/// Discovery parameters, as accepted by `GET /services`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceQuery {
    pub category: String,
    /// Inclusive price ceiling in wei.
    pub max_price: WeiAmount,
    pub chain_id: ChainId,
}

impl Default for ServiceQuery {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            max_price: WeiAmount::from(1_000_000_000_000_000_000u64),
            chain_id: DEFAULT_CHAIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// Read from the registry contract.
    Live,
    /// Served from the built-in catalog.
    Fallback,
}

/// Why a lookup was served from the built-in catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoRegistryConfigured,
    ChainUnsupported(ChainId),
    LookupFailed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoRegistryConfigured => f.write_str("No registry address configured"),
            FallbackReason::ChainUnsupported(chain_id) => {
                write!(f, "No registry configured for chain {chain_id}")
            }
            FallbackReason::LookupFailed(message) => write!(f, "Registry lookup failed: {message}"),
        }
    }
}

impl Serialize for FallbackReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Ranked offerings plus where they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDiscovery {
    pub success: bool,
    pub count: usize,
    pub services: Vec<ServiceOffering>,
    pub source: DiscoverySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FallbackReason>,
}

impl ServiceDiscovery {
    pub fn live(services: Vec<ServiceOffering>) -> Self {
        Self {
            success: true,
            count: services.len(),
            services,
            source: DiscoverySource::Live,
            reason: None,
        }
    }

    pub fn fallback(services: Vec<ServiceOffering>, reason: FallbackReason) -> Self {
        Self {
            success: true,
            count: services.len(),
            services,
            source: DiscoverySource::Fallback,
            reason: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == DiscoverySource::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults_and_parsing() {
        let query = ServiceQuery::default();
        assert_eq!(query.category, "news");
        assert_eq!(query.chain_id, ChainId::new(240));
        assert_eq!(query.max_price.format_ether(), "1.0");

        let query: ServiceQuery = serde_json::from_value(serde_json::json!({
            "category": "defi",
            "maxPrice": "300000000000000000"
        }))
        .unwrap();
        assert_eq!(query.category, "defi");
        assert_eq!(query.max_price, WeiAmount::from(300_000_000_000_000_000u64));
        assert_eq!(query.chain_id, ChainId::new(240));
    }

    #[test]
    fn test_fallback_serialization() {
        let discovery = ServiceDiscovery::fallback(vec![], FallbackReason::NoRegistryConfigured);
        let json = serde_json::to_value(&discovery).unwrap();
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["reason"], "No registry address configured");
        assert_eq!(json["count"], 0);

        let json = serde_json::to_value(ServiceDiscovery::live(vec![])).unwrap();
        assert_eq!(json["source"], "live");
        assert!(json.get("reason").is_none());
    }
}
