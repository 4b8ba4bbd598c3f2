//! Chain identifiers and the registry of supported chains.
//!
//! # Architecture
//!
//! - [`ChainId`] - A numeric EIP-155 chain identifier
//! - [`ChainConfig`] - Display name, RPC endpoint and native symbol for one chain
//! - [`ChainRegistry`] - Immutable lookup table built once at startup
//! - [`ChainsConfig`] - Per-chain overrides read from the config file
//!
//! # Example
//!
//! ```
//! use nexus_types::chain::{ChainId, ChainRegistry, ChainsConfig};
//!
//! let registry = ChainRegistry::build(&ChainsConfig::default(), |_| None).unwrap();
//! let cronos = registry.config_for(ChainId::new(240)).unwrap();
//! assert_eq!(cronos.native_symbol, "zkCRO");
//! assert!(registry.config_for(ChainId::new(1)).is_err());
//! ```

mod chain_id;

pub use chain_id::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::config::{LiteralOrEnv, RpcConfig};
use crate::networks::{KNOWN_CHAINS, KnownChain};

/// Asynchronously constructs an instance of `Self` from a configuration type.
///
/// Used to build chain providers and storage backends from their
/// configuration at startup.
#[async_trait::async_trait]
pub trait FromConfig<TConfig>
where
    Self: Sized,
{
    async fn from_config(config: &TConfig) -> Result<Self, Box<dyn std::error::Error>>;
}

/// Static description of one supported chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc: RpcConfig,
    pub native_symbol: String,
}

impl ChainConfig {
    fn from_known(known: &KnownChain, rpc: RpcConfig) -> Self {
        Self {
            chain_id: known.id(),
            name: known.name.to_string(),
            rpc,
            native_symbol: known.native_symbol.to_string(),
        }
    }
}

/// Per-chain overrides from the config file.
///
/// ```json
/// { "84532": { "rpc": "$BASE_RPC_URL", "rate_limit": 20, "eip1559": true } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainOverride {
    #[serde(default)]
    pub rpc: Option<LiteralOrEnv<Url>>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    /// Whether the chain prices gas with EIP-1559. Defaults to `true`.
    #[serde(default)]
    pub eip1559: Option<bool>,
}

/// Overrides keyed by chain id. Absent chains use their defaults.
pub type ChainsConfig = BTreeMap<ChainId, ChainOverride>;

/// Returned when a chain id is not in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Chain {0} is not supported")]
pub struct ChainNotFound(pub ChainId);

#[derive(Debug, thiserror::Error)]
pub enum ChainRegistryError {
    #[error("Chain {0} in configuration is not one of the supported chains")]
    UnknownChain(ChainId),
    #[error("Invalid RPC URL in ${var}: {source}")]
    InvalidRpcEnv {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid built-in RPC URL for chain {chain_id}: {source}")]
    InvalidDefaultRpc {
        chain_id: ChainId,
        #[source]
        source: url::ParseError,
    },
}

/// Registry of the supported chains, indexed by chain id.
///
/// Built once during startup and never mutated afterwards; share it behind an
/// `Arc`.
#[derive(Debug, Clone)]
pub struct ChainRegistry(BTreeMap<ChainId, ChainConfig>);

impl ChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = ChainConfig>) -> Self {
        Self(chains.into_iter().map(|c| (c.chain_id, c)).collect())
    }

    /// Builds the registry from config overrides and the process environment.
    pub fn from_config(config: &ChainsConfig) -> Result<Self, ChainRegistryError> {
        Self::build(config, |name| std::env::var(name).ok())
    }

    /// Builds the registry with an explicit environment lookup.
    ///
    /// RPC endpoint precedence per chain: config file override, then the
    /// chain's environment variable, then the public default.
    pub fn build<F>(config: &ChainsConfig, env: F) -> Result<Self, ChainRegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(unknown) = config
            .keys()
            .find(|id| !KNOWN_CHAINS.iter().any(|k| k.id() == **id))
        {
            return Err(ChainRegistryError::UnknownChain(*unknown));
        }
        let mut chains = BTreeMap::new();
        for known in KNOWN_CHAINS.iter() {
            let chain_override = config.get(&known.id());
            let http = match chain_override.and_then(|o| o.rpc.as_ref()) {
                Some(url) => url.inner().clone(),
                None => match env(known.rpc_env).filter(|v| !v.trim().is_empty()) {
                    Some(value) => Url::parse(value.trim()).map_err(|source| {
                        ChainRegistryError::InvalidRpcEnv {
                            var: known.rpc_env,
                            source,
                        }
                    })?,
                    None => Url::parse(known.default_rpc).map_err(|source| {
                        ChainRegistryError::InvalidDefaultRpc {
                            chain_id: known.id(),
                            source,
                        }
                    })?,
                },
            };
            let rpc = RpcConfig {
                http,
                rate_limit: chain_override.and_then(|o| o.rate_limit),
            };
            chains.insert(known.id(), ChainConfig::from_known(known, rpc));
        }
        Ok(Self(chains))
    }

    /// Looks up a chain by id.
    pub fn config_for(&self, chain_id: ChainId) -> Result<&ChainConfig, ChainNotFound> {
        self.0.get(&chain_id).ok_or(ChainNotFound(chain_id))
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.0.contains_key(&chain_id)
    }

    /// Iterates chains in ascending chain-id order.
    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
