use alloy_primitives::B256;
use nexus_types::chain::{ChainConfig, ChainId};
use std::fmt;
use std::str::FromStr;

/// Settlement provider configuration for one chain.
#[derive(Debug, Clone)]
pub struct Eip155ChainConfig {
    pub chain: ChainConfig,
    pub signer: EvmPrivateKey,
    /// Whether the chain supports EIP-1559 gas pricing.
    pub eip1559: bool,
    /// How long to wait till the transaction receipt is available.
    pub receipt_timeout_secs: u64,
}

impl Eip155ChainConfig {
    pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 30;

    pub fn new(chain: ChainConfig, signer: EvmPrivateKey) -> Self {
        Self {
            chain,
            signer,
            eip1559: true,
            receipt_timeout_secs: Self::DEFAULT_RECEIPT_TIMEOUT_SECS,
        }
    }

    pub fn with_eip1559(mut self, eip1559: bool) -> Self {
        self.eip1559 = eip1559;
        self
    }

    pub fn with_receipt_timeout_secs(mut self, secs: u64) -> Self {
        self.receipt_timeout_secs = secs;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id
    }
}

/// A validated EVM private key (32 bytes).
///
/// Accepts `0x`-prefixed or bare hex. `Debug` output is redacted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    /// Get the raw 32 bytes of the private key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref()
    }

    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl fmt::Debug for EvmPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvmPrivateKey(<redacted>)")
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s.trim())
            .map(Self)
            .map_err(|e| format!("Invalid evm private key: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key_parse() {
        let key: EvmPrivateKey =
            "0xcafe000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap();
        assert_eq!(key.as_bytes()[0], 0xca);
        assert_eq!(key.as_bytes()[31], 0x01);
    }

    #[test]
    fn test_private_key_rejects_short_input() {
        assert!("0xcafe".parse::<EvmPrivateKey>().is_err());
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key: EvmPrivateKey =
            "0xcafe000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap();
        assert!(!format!("{key:?}").contains("cafe"));
    }
}
