//! EVM providers and their configuration.
//!
//! - [`config`] - Signing key and per-chain provider settings
//! - [`pending_nonce_manager`] - Nonce management for concurrent settlement
//! - [`provider`] - [`Eip155ChainProvider`], the native-transfer settlement backend

pub mod config;
pub mod pending_nonce_manager;
pub mod provider;

pub use config::*;
pub use pending_nonce_manager::*;
pub use provider::*;
