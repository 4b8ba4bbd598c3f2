//! Millisecond Unix timestamps for ledger and journal records.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// Milliseconds since the Unix epoch.
///
/// # Serialization
///
/// Serialized as a stringified integer to avoid loss of precision in JSON:
///
/// ```json
/// "1730000000000"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash, Default)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UnixTimestamp {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the current system time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_serializes_as_string() {
        let ts = UnixTimestamp::from_millis(1730000000000);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1730000000000\"");
        let back: UnixTimestamp = serde_json::from_str("\"1730000000000\"").unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_now_is_after_2024() {
        assert!(UnixTimestamp::now().as_millis() > 1_704_067_200_000);
    }
}
