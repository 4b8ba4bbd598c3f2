//! Integer amounts in the smallest native unit.
//!
//! All ledger arithmetic happens on [`WeiAmount`], a non-negative 256-bit
//! integer. Amounts travel over the wire as decimal strings
//! (`"100000000000000000"`); the ether-denominated rendering produced by
//! [`WeiAmount::format_ether`] is for display only and is never parsed back.
//!
//! # Example
//!
//! ```
//! use nexus_types::util::WeiAmount;
//!
//! let amount: WeiAmount = "100000000000000000".parse().unwrap();
//! assert_eq!(amount.format_ether(), "0.1");
//!
//! assert!("-1".parse::<WeiAmount>().is_err());
//! assert!("0.5".parse::<WeiAmount>().is_err());
//! ```

use alloy_primitives::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of decimals of every supported native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// A non-negative integer amount in wei (or the chain's equivalent smallest unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WeiAmount(U256);

/// Errors that can occur when parsing a [`WeiAmount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeiAmountParseError {
    #[error("Amount must not be empty")]
    Empty,
    #[error("Amount must not be negative: {0}")]
    Negative(String),
    #[error("Amount must be an integer in the smallest unit: {0}")]
    NotInteger(String),
    #[error("Amount must be a decimal integer: {0}")]
    InvalidFormat(String),
    #[error("Amount does not fit in 256 bits: {0}")]
    Overflow(String),
}

impl WeiAmount {
    pub const ZERO: WeiAmount = WeiAmount(U256::ZERO);

    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: WeiAmount) -> Option<WeiAmount> {
        self.0.checked_add(rhs.0).map(WeiAmount)
    }

    pub fn checked_sub(self, rhs: WeiAmount) -> Option<WeiAmount> {
        self.0.checked_sub(rhs.0).map(WeiAmount)
    }

    /// Renders the amount in whole units of the native currency.
    ///
    /// Always keeps at least one fractional digit: `"0.0"`, `"1.0"`, `"0.25"`.
    pub fn format_ether(&self) -> String {
        let unit = U256::from(10u64).pow(U256::from(NATIVE_DECIMALS));
        let (whole, fraction) = self.0.div_rem(unit);
        let fraction = format!("{:018}", fraction.saturating_to::<u64>());
        let fraction = fraction.trim_end_matches('0');
        let fraction = if fraction.is_empty() { "0" } else { fraction };
        format!("{whole}.{fraction}")
    }
}

impl From<u64> for WeiAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for WeiAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<WeiAmount> for U256 {
    fn from(value: WeiAmount) -> Self {
        value.0
    }
}

impl fmt::Display for WeiAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WeiAmount {
    type Err = WeiAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WeiAmountParseError::Empty);
        }
        if s.starts_with('-') {
            return Err(WeiAmountParseError::Negative(s.to_string()));
        }
        if s.contains(['.', 'e', 'E']) && !s.starts_with("0x") {
            return Err(WeiAmountParseError::NotInteger(s.to_string()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WeiAmountParseError::InvalidFormat(s.to_string()));
        }
        U256::from_str_radix(s, 10)
            .map(WeiAmount)
            .map_err(|_| WeiAmountParseError::Overflow(s.to_string()))
    }
}

impl Serialize for WeiAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for WeiAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WeiAmountVisitor;

        impl Visitor<'_> for WeiAmountVisitor {
            type Value = WeiAmount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a non-negative integer amount as a decimal string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                WeiAmount::from_str(value).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(WeiAmount::from(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(WeiAmount::from)
                    .map_err(|_| E::custom(WeiAmountParseError::Negative(value.to_string())))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                Err(E::custom(WeiAmountParseError::NotInteger(value.to_string())))
            }
        }

        deserializer.deserialize_any(WeiAmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let amount: WeiAmount = "100000000000000000".parse().unwrap();
        assert_eq!(amount.inner(), U256::from(100_000_000_000_000_000u64));
        assert_eq!(" 42 ".parse::<WeiAmount>().unwrap(), WeiAmount::from(42));
        assert!("0".parse::<WeiAmount>().unwrap().is_zero());
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!("".parse::<WeiAmount>(), Err(WeiAmountParseError::Empty));
        assert!(matches!(
            "-5".parse::<WeiAmount>(),
            Err(WeiAmountParseError::Negative(_))
        ));
        assert!(matches!(
            "1.5".parse::<WeiAmount>(),
            Err(WeiAmountParseError::NotInteger(_))
        ));
        assert!(matches!(
            "1e18".parse::<WeiAmount>(),
            Err(WeiAmountParseError::NotInteger(_))
        ));
        assert!(matches!(
            "0x10".parse::<WeiAmount>(),
            Err(WeiAmountParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "+10".parse::<WeiAmount>(),
            Err(WeiAmountParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_overflow() {
        let too_big = format!("{}0", U256::MAX);
        assert!(matches!(
            too_big.parse::<WeiAmount>(),
            Err(WeiAmountParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_serde_string_and_number() {
        let amount = WeiAmount::from(250);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"250\"");
        assert_eq!(serde_json::from_str::<WeiAmount>("\"250\"").unwrap(), amount);
        assert_eq!(serde_json::from_str::<WeiAmount>("250").unwrap(), amount);
        assert!(serde_json::from_str::<WeiAmount>("-250").is_err());
        assert!(serde_json::from_str::<WeiAmount>("2.5").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(WeiAmount::ZERO.format_ether(), "0.0");
        assert_eq!(
            WeiAmount::from(1_000_000_000_000_000_000).format_ether(),
            "1.0"
        );
        assert_eq!(
            WeiAmount::from(250_000_000_000_000_000).format_ether(),
            "0.25"
        );
        assert_eq!(WeiAmount::from(1).format_ether(), "0.000000000000000001");
        assert_eq!(
            "12345000000000000000000".parse::<WeiAmount>().unwrap().format_ether(),
            "12345.0"
        );
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = WeiAmount::from(10);
        let b = WeiAmount::from(3);
        assert_eq!(a.checked_sub(b), Some(WeiAmount::from(7)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(WeiAmount::new(U256::MAX).checked_add(b), None);
    }
}
