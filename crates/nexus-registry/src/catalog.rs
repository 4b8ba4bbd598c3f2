//! Built-in offerings served when the registry contract cannot be used.

use alloy_primitives::{Address, address};
use nexus_types::util::WeiAmount;

use crate::offering::ServiceOffering;

/// Provider behind every built-in offering.
pub const DEMO_PROVIDER: Address = address!("0x742d35Cc6634C0532925a3b844Bc9e7595f5e123");

struct CatalogEntry {
    category: &'static str,
    endpoint: &'static str,
    price_wei: u64,
    reputation: u64,
    total_calls: u64,
}

const CATALOG: [CatalogEntry; 5] = [
    CatalogEntry {
        category: "news",
        endpoint: "http://localhost:4000/api/news/crypto",
        price_wei: 100_000_000_000_000_000,
        reputation: 234,
        total_calls: 567,
    },
    CatalogEntry {
        category: "sentiment",
        endpoint: "http://localhost:4000/api/sentiment/btc",
        price_wei: 200_000_000_000_000_000,
        reputation: 189,
        total_calls: 432,
    },
    CatalogEntry {
        category: "charts",
        endpoint: "http://localhost:4000/api/charts/btc/1h",
        price_wei: 300_000_000_000_000_000,
        reputation: 156,
        total_calls: 321,
    },
    CatalogEntry {
        category: "defi",
        endpoint: "http://localhost:4000/api/defi/yields",
        price_wei: 250_000_000_000_000_000,
        reputation: 145,
        total_calls: 289,
    },
    CatalogEntry {
        category: "predictions",
        endpoint: "http://localhost:4000/api/predictions/btc",
        price_wei: 1_000_000_000_000_000_000,
        reputation: 78,
        total_calls: 145,
    },
];

/// Built-in offerings for `category`, empty for unknown categories.
pub fn offerings(category: &str) -> Vec<ServiceOffering> {
    CATALOG
        .iter()
        .filter(|entry| entry.category == category)
        .map(|entry| {
            let price = WeiAmount::from(entry.price_wei);
            ServiceOffering {
                provider_address: DEMO_PROVIDER,
                endpoint: entry.endpoint.to_string(),
                price_wei: price,
                price_formatted: price.format_ether(),
                category: entry.category.to_string(),
                reputation_score: entry.reputation,
                total_calls: entry.total_calls,
                active: true,
            }
        })
        .collect()
}

/// Categories present in the built-in catalog.
pub fn categories() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|entry| entry.category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let news = offerings("news");
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].endpoint, "http://localhost:4000/api/news/crypto");
        assert_eq!(news[0].price_formatted, "0.1");
        assert_eq!(news[0].reputation_score, 234);
        assert_eq!(offerings("predictions")[0].price_formatted, "1.0");
        assert!(offerings("weather").is_empty());
        assert_eq!(categories().count(), 5);
    }
}
