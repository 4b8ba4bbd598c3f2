//! Configuration for the Nexus facilitator server.
//!
//! Every field is optional. Missing values fall back to environment
//! variables, then to built-in defaults:
//!
//! ```json
//! {
//!   "port": 3001,
//!   "host": "0.0.0.0",
//!   "chains": { "84532": { "rpc": "$BASE_RPC_URL", "rate_limit": 20 } },
//!   "signer": "$MASTER_WALLET_PRIVATE_KEY",
//!   "database_url": "$DATABASE_URL",
//!   "registry": { "address": "$REGISTRY_ADDRESS", "chain_id": 240 },
//!   "settlement_timeout_secs": 60,
//!   "receipt_timeout_secs": 30
//! }
//! ```

use alloy_primitives::Address;
use clap::Parser;
use nexus_chain_eip155::chain::EvmPrivateKey;
use nexus_types::chain::{ChainId, ChainsConfig};
use nexus_types::config::LiteralOrEnv;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI arguments for the Nexus facilitator server.
#[derive(Parser, Debug)]
#[command(name = "nexus-facilitator")]
#[command(about = "Nexus x402 facilitator HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG")]
    config: Option<PathBuf>,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    chains: ChainsConfig,
    #[serde(default)]
    signer: Option<LiteralOrEnv<EvmPrivateKey>>,
    #[serde(default)]
    database_url: Option<LiteralOrEnv<String>>,
    #[serde(default)]
    registry: RegistryConfig,
    #[serde(default = "config_defaults::default_settlement_timeout_secs")]
    settlement_timeout_secs: u64,
    #[serde(default = "config_defaults::default_receipt_timeout_secs")]
    receipt_timeout_secs: u64,
}

/// Location of the `NexusRegistry` contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    address: Option<LiteralOrEnv<Address>>,
    /// Chain the contract is deployed on. All supported chains when absent.
    #[serde(default)]
    chain_id: Option<ChainId>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            chains: ChainsConfig::default(),
            signer: None,
            database_url: None,
            registry: RegistryConfig::default(),
            settlement_timeout_secs: config_defaults::default_settlement_timeout_secs(),
            receipt_timeout_secs: config_defaults::default_receipt_timeout_secs(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 3001;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_CONFIG_PATH: &str = "config.json";
    pub const DEFAULT_SETTLEMENT_TIMEOUT_SECS: u64 = 60;
    pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 30;

    pub const SIGNER_ENV: &str = "MASTER_WALLET_PRIVATE_KEY";
    pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
    pub const REGISTRY_ADDRESS_ENV: &str = "REGISTRY_ADDRESS";

    /// Returns the default port value with fallback: $PORT env var -> 3001
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_settlement_timeout_secs() -> u64 {
        DEFAULT_SETTLEMENT_TIMEOUT_SECS
    }

    pub fn default_receipt_timeout_secs() -> u64 {
        DEFAULT_RECEIPT_TIMEOUT_SECS
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid signer key in ${var}: {message}")]
    InvalidSigner { var: &'static str, message: String },
    #[error("Invalid registry address in ${var}: {message}")]
    InvalidRegistryAddress { var: &'static str, message: String },
}

/// Reads `name` from `env`, treating blank values as unset.
fn non_empty<F>(env: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Per-chain overrides, keyed by chain id.
    pub fn chains(&self) -> &ChainsConfig {
        &self.chains
    }

    pub fn registry_chain_id(&self) -> Option<ChainId> {
        self.registry.chain_id
    }

    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement_timeout_secs)
    }

    pub fn receipt_timeout_secs(&self) -> u64 {
        self.receipt_timeout_secs
    }

    /// The settlement signing key, or `None` for demo mode.
    ///
    /// A malformed key is an error rather than a silent switch to demo mode.
    pub fn signer(&self) -> Result<Option<EvmPrivateKey>, ConfigError> {
        self.signer_with(|name| std::env::var(name).ok())
    }

    fn signer_with<F>(&self, env: F) -> Result<Option<EvmPrivateKey>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(signer) = &self.signer {
            return Ok(Some(*signer.inner()));
        }
        non_empty(&env, config_defaults::SIGNER_ENV)
            .map(|raw| raw.parse::<EvmPrivateKey>())
            .transpose()
            .map_err(|message| ConfigError::InvalidSigner {
                var: config_defaults::SIGNER_ENV,
                message,
            })
    }

    /// Postgres connection string, when the ledger should be persistent.
    pub fn database_url(&self) -> Option<String> {
        self.database_url_with(|name| std::env::var(name).ok())
    }

    fn database_url_with<F>(&self, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        match &self.database_url {
            Some(url) => Some(url.inner().clone()).filter(|url| !url.trim().is_empty()),
            None => non_empty(&env, config_defaults::DATABASE_URL_ENV),
        }
    }

    /// Address of the `NexusRegistry` contract, if discovery should be live.
    pub fn registry_address(&self) -> Result<Option<Address>, ConfigError> {
        self.registry_address_with(|name| std::env::var(name).ok())
    }

    fn registry_address_with<F>(&self, env: F) -> Result<Option<Address>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = &self.registry.address {
            return Ok(Some(*address.inner()));
        }
        non_empty(&env, config_defaults::REGISTRY_ADDRESS_ENV)
            .map(|raw| raw.parse::<Address>())
            .transpose()
            .map_err(|e| ConfigError::InvalidRegistryAddress {
                var: config_defaults::REGISTRY_ADDRESS_ENV,
                message: e.to_string(),
            })
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument (or `$CONFIG`)
    /// 2. `./config.json` (if it exists)
    ///
    /// Without a config file every value comes from the environment or the
    /// built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        match cli_args.config {
            Some(path) => {
                let config_path = path
                    .canonicalize()
                    .map_err(|e| ConfigError::FileRead(path, e))?;
                Self::load_from_path(config_path)
            }
            None => {
                let default_path = Path::new(config_defaults::DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from_path(default_path.to_path_buf())
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.settlement_timeout(), Duration::from_secs(60));
        assert_eq!(config.receipt_timeout_secs(), 30);
        assert!(config.chains().is_empty());
        assert_eq!(config.signer_with(no_env).unwrap(), None);
        assert_eq!(config.database_url_with(no_env), None);
        assert_eq!(config.registry_address_with(no_env).unwrap(), None);
        assert_eq!(config.registry_chain_id(), None);
    }

    #[test]
    fn test_full_config() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "port": 8080,
            "host": "127.0.0.1",
            "chains": {"84532": {"rpc": "https://base.example.org", "eip1559": false}},
            "signer": KEY,
            "database_url": "postgres://nexus@localhost/nexus",
            "registry": {
                "address": "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123",
                "chain_id": 240
            },
            "settlement_timeout_secs": 5
        }))
        .unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.host().to_string(), "127.0.0.1");
        assert_eq!(
            config.chains()[&ChainId::new(84532)].eip1559,
            Some(false)
        );
        assert_eq!(config.signer_with(no_env).unwrap(), Some(KEY.parse().unwrap()));
        assert_eq!(
            config.database_url_with(no_env).as_deref(),
            Some("postgres://nexus@localhost/nexus")
        );
        assert_eq!(config.registry_chain_id(), Some(ChainId::new(240)));
        assert!(config.registry_address_with(no_env).unwrap().is_some());
        assert_eq!(config.settlement_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_fallbacks() {
        let env = |name: &str| match name {
            "MASTER_WALLET_PRIVATE_KEY" => Some(KEY.to_string()),
            "DATABASE_URL" => Some("postgres://localhost/nexus".to_string()),
            "REGISTRY_ADDRESS" => Some("   ".to_string()),
            _ => None,
        };
        let config = Config::default();
        assert!(config.signer_with(env).unwrap().is_some());
        assert_eq!(
            config.database_url_with(env).as_deref(),
            Some("postgres://localhost/nexus")
        );
        assert_eq!(config.registry_address_with(env).unwrap(), None);
    }

    #[test]
    fn test_invalid_signer_is_an_error() {
        let env = |name: &str| (name == "MASTER_WALLET_PRIVATE_KEY").then(|| "0x1234".to_string());
        let err = Config::default().signer_with(env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSigner {
                var: "MASTER_WALLET_PRIVATE_KEY",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_signer_in_file_is_a_parse_error() {
        let result = serde_json::from_str::<Config>(r#"{"signer": "not-a-key"}"#);
        assert!(result.is_err());
    }
}
