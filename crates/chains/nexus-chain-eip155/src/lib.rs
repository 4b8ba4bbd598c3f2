//! EVM chain support for Nexus settlement.
//!
//! This crate turns the operator's signing key into an
//! [`Eip155ChainProvider`](chain::Eip155ChainProvider) per supported chain.
//! Each provider implements [`NativeSettlement`](nexus_types::settlement::NativeSettlement):
//! it sends a plain value transfer to the payee and only reports success once
//! the receipt is confirmed with a successful status.
//!
//! # Example
//!
//! ```ignore
//! use nexus_chain_eip155::chain::{Eip155ChainConfig, Eip155ChainProvider};
//! use nexus_types::chain::FromConfig;
//!
//! let provider = Eip155ChainProvider::from_config(&config).await?;
//! let tx_hash = provider.transfer_native(payee, amount).await?;
//! ```

pub mod chain;
