//! Core types for Nexus x402 micropayments.
//!
//! This crate holds the vocabulary shared by the facilitator server, the
//! registry query and the paying HTTP client. It is deliberately free of any
//! storage or transport code.
//!
//! # Modules
//!
//! - [`chain`] - Chain identifiers and the registry of supported chains
//! - [`config`] - RPC config and environment variable resolution
//! - [`facilitator`] - The trait a payment backend implements
//! - [`networks`] - The four chains known out of the box
//! - [`proto`] - JSON wire types for the facilitator API and x402 challenges
//! - [`settlement`] - On-chain settlement seam used by the payment executor
//! - [`timestamp`] - Millisecond Unix timestamps
//! - [`util`] - Wei amounts, wallet addresses and display formatting

pub mod chain;
pub mod config;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod settlement;
pub mod timestamp;
pub mod util;
