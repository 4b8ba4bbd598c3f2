//! Numeric EIP-155 chain identifiers.
//!
//! Every chain Nexus settles on is EVM-compatible, so a chain is identified by
//! its plain EIP-155 number (`240` for Cronos zkEVM Testnet, `84532` for Base
//! Sepolia). The CAIP-2 form (`eip155:240`) is available for logs and for
//! interop with other x402 tooling.
//!
//! # Example
//!
//! ```
//! use nexus_types::chain::ChainId;
//!
//! let cronos = ChainId::new(240);
//! assert_eq!(cronos.to_string(), "240");
//! assert_eq!(cronos.as_caip2(), "eip155:240");
//!
//! let parsed: ChainId = "84532".parse().unwrap();
//! assert_eq!(parsed.inner(), 84532);
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The CAIP-2 namespace for EVM-compatible chains.
pub const EIP155_NAMESPACE: &str = "eip155";

/// A numeric EIP-155 chain identifier.
///
/// # Serialization
///
/// Serializes as a JSON number. Deserializes from either a number or a
/// decimal string, since query strings and path segments carry chain ids
/// as text while JSON bodies usually carry them as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(u64);

impl ChainId {
    pub const fn new(chain_id: u64) -> Self {
        Self(chain_id)
    }

    pub fn inner(&self) -> u64 {
        self.0
    }

    /// Renders the chain as a CAIP-2 identifier, e.g. `eip155:84532`.
    pub fn as_caip2(&self) -> String {
        format!("{}:{}", EIP155_NAMESPACE, self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ChainId> for u64 {
    fn from(value: ChainId) -> Self {
        value.0
    }
}

/// Error returned when parsing an invalid chain id string.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id {0}: expected a positive decimal integer")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // `eip155:240` is accepted as well as the bare reference
        let reference = s
            .strip_prefix(EIP155_NAMESPACE)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(s);
        if reference.is_empty() || !reference.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ChainIdFormatError(s.to_string()));
        }
        reference
            .parse::<u64>()
            .map(ChainId)
            .map_err(|_| ChainIdFormatError(s.to_string()))
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChainIdVisitor;

        impl Visitor<'_> for ChainIdVisitor {
            type Value = ChainId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a chain id as a number or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(ChainId(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(ChainId)
                    .map_err(|_| E::custom(format!("chain id must not be negative: {value}")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                ChainId::from_str(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ChainIdVisitor)
    }
}
