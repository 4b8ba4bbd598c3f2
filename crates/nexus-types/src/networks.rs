//! The chains Nexus supports out of the box.
//!
//! The set is fixed: a deployment can repoint a chain at a different RPC
//! endpoint (through its environment variable or the config file) but cannot
//! add chains. Every default endpoint is a public testnet.

use crate::chain::ChainId;

/// A well-known chain with its default public RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownChain {
    /// EIP-155 chain number.
    pub chain_id: u64,
    /// Human-readable display name.
    pub name: &'static str,
    /// Default public RPC endpoint.
    pub default_rpc: &'static str,
    /// Symbol of the native currency used for settlement.
    pub native_symbol: &'static str,
    /// Environment variable that overrides [`KnownChain::default_rpc`].
    pub rpc_env: &'static str,
}

impl KnownChain {
    pub fn id(&self) -> ChainId {
        ChainId::new(self.chain_id)
    }
}

pub const CRONOS_ZKEVM_TESTNET: ChainId = ChainId::new(240);
pub const BASE_SEPOLIA: ChainId = ChainId::new(84532);
pub const POLYGON_AMOY: ChainId = ChainId::new(80002);
pub const ETHEREUM_SEPOLIA: ChainId = ChainId::new(11155111);

/// Chain used when a caller does not name one.
pub const DEFAULT_CHAIN: ChainId = CRONOS_ZKEVM_TESTNET;

pub static KNOWN_CHAINS: [KnownChain; 4] = [
    KnownChain {
        chain_id: 240,
        name: "Cronos zkEVM Testnet",
        default_rpc: "https://testnet.zkevm.cronos.org",
        native_symbol: "zkCRO",
        rpc_env: "CRONOS_RPC_URL",
    },
    KnownChain {
        chain_id: 84532,
        name: "Base Sepolia",
        default_rpc: "https://sepolia.base.org",
        native_symbol: "ETH",
        rpc_env: "BASE_RPC_URL",
    },
    KnownChain {
        chain_id: 80002,
        name: "Polygon Amoy",
        default_rpc: "https://rpc-amoy.polygon.technology",
        native_symbol: "MATIC",
        rpc_env: "POLYGON_RPC_URL",
    },
    KnownChain {
        chain_id: 11155111,
        name: "Ethereum Sepolia",
        default_rpc: "https://rpc.sepolia.org",
        native_symbol: "ETH",
        rpc_env: "SEPOLIA_RPC_URL",
    },
];

/// Looks up a known chain by id.
pub fn known_chain(chain_id: ChainId) -> Option<&'static KnownChain> {
    KNOWN_CHAINS.iter().find(|c| c.chain_id == chain_id.inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_chains_are_distinct() {
        let mut ids: Vec<u64> = KNOWN_CHAINS.iter().map(|c| c.chain_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), KNOWN_CHAINS.len());
    }

    #[test]
    fn test_known_chain_lookup() {
        let cronos = known_chain(CRONOS_ZKEVM_TESTNET).unwrap();
        assert_eq!(cronos.native_symbol, "zkCRO");
        assert_eq!(known_chain(POLYGON_AMOY).unwrap().name, "Polygon Amoy");
        assert!(known_chain(ChainId::new(1)).is_none());
    }
}
