//! Wallet addresses used as ledger keys.

use alloy_primitives::{Address, hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A wallet identified by its 20-byte EVM address.
///
/// The ledger keys balances by wallet, so the address is normalized: it
/// always renders as lower-case `0x`-prefixed hex regardless of the casing
/// (checksummed or not) it was submitted with.
///
/// ```
/// use nexus_types::util::WalletAddress;
///
/// let wallet: WalletAddress = "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123".parse().unwrap();
/// assert_eq!(wallet.to_string(), "0x742d35cc6634c0532925a3b844bc9e7595f5e123");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalletAddress(Address);

#[derive(Debug, thiserror::Error)]
#[error("Invalid wallet address {0}")]
pub struct WalletAddressParseError(String);

impl WalletAddress {
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }
}

impl From<Address> for WalletAddress {
    fn from(value: Address) -> Self {
        Self(value)
    }
}

impl From<WalletAddress> for Address {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0))
    }
}

impl FromStr for WalletAddress {
    type Err = WalletAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.starts_with("0x") {
            return Err(WalletAddressParseError(s.to_string()));
        }
        Address::from_str(s)
            .map(WalletAddress)
            .map_err(|_| WalletAddressParseError(s.to_string()))
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        WalletAddress::from_str(&s).map_err(serde::de::Error::custom)
    }
}
