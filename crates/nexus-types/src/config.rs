//! Configuration types shared across Nexus crates.
//!
//! # Environment Variable Resolution
//!
//! The [`LiteralOrEnv`] wrapper type allows configuration values to be specified
//! either as literal values or as references to environment variables:
//!
//! ```json
//! {
//!   "signer": "$MASTER_WALLET_PRIVATE_KEY",
//!   "database_url": "${DATABASE_URL}",
//!   "chains": { "240": { "rpc": "https://testnet.zkevm.cronos.org" } }
//! }
//! ```
//!
//! This keeps secrets out of configuration files while still allowing them
//! to be loaded at runtime.

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;
use url::Url;

/// RPC provider configuration for a single chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// HTTP URL for the RPC endpoint.
    pub http: Url,
    /// Rate limit for requests per second (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"https://sepolia.base.org"`
/// - Simple env var: `"$BASE_RPC_URL"`
/// - Braced env var: `"${BASE_RPC_URL}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if s.starts_with("${") && s.ends_with('}') {
            Some(&s[2..s.len() - 1])
        } else if let Some(var_name) = s.strip_prefix('$') {
            let valid =
                !var_name.is_empty() && var_name.chars().all(|c| c.is_alphanumeric() || c == '_');
            valid.then_some(var_name)
        } else {
            None
        }
    }
}

impl<T> LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    /// Resolves a raw config string, looking environment references up through `env`.
    pub fn resolve_with<F>(raw: &str, env: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = match Self::parse_env_var_syntax(raw) {
            Some(var_name) => env(var_name).ok_or_else(|| {
                format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, raw
                )
            })?,
            None => raw.to_string(),
        };
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| format!("Failed to parse value: {}", e))
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::resolve_with(&s, |name| std::env::var(name).ok()).map_err(serde::de::Error::custom)
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "NEXUS_TEST_RPC" => Some("https://rpc.example.org/".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_literal_value() {
        let value = LiteralOrEnv::<Url>::resolve_with("https://sepolia.base.org", env).unwrap();
        assert_eq!(value.as_str(), "https://sepolia.base.org/");
    }

    #[test]
    fn test_simple_and_braced_env_var() {
        let simple = LiteralOrEnv::<Url>::resolve_with("$NEXUS_TEST_RPC", env).unwrap();
        let braced = LiteralOrEnv::<Url>::resolve_with("${NEXUS_TEST_RPC}", env).unwrap();
        assert_eq!(simple, braced);
        assert_eq!(simple.as_str(), "https://rpc.example.org/");
    }

    #[test]
    fn test_missing_env_var() {
        let err = LiteralOrEnv::<Url>::resolve_with("$NEXUS_TEST_MISSING", env).unwrap_err();
        assert!(err.contains("NEXUS_TEST_MISSING"));
    }

    #[test]
    fn test_unparseable_value() {
        assert!(LiteralOrEnv::<u16>::resolve_with("not-a-port", env).is_err());
    }
}
