#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Local facilitator for Nexus x402 micropayments.
//!
//! This crate provides [`FacilitatorLocal`], a
//! [`Facilitator`](nexus_types::facilitator::Facilitator) implementation that
//! keeps per-wallet, per-chain virtual balances, credits on-chain deposits
//! and settles payments to providers, on chain or simulated in demo mode.
//!
//! # Modules
//!
//! - [`ledger`] - Balance Ledger Store and Transaction Journal ([`ledger::MemoryLedger`], `PostgresLedger`)
//! - [`facilitator_local`] - Deposit processing and the payment executor
//! - [`handlers`] - HTTP endpoints
//! - [`util`] - Graceful shutdown and telemetry
//!
//! # Example
//!
//! ```ignore
//! use nexus_facilitator_local::{FacilitatorLocal, handlers, ledger::MemoryLedger};
//! use nexus_types::chain::{ChainRegistry, ChainsConfig};
//! use nexus_types::settlement::SettlementRegistry;
//! use std::sync::Arc;
//!
//! let chains = Arc::new(ChainRegistry::from_config(&ChainsConfig::default())?);
//! let facilitator = FacilitatorLocal::new(chains, Arc::new(MemoryLedger::new()), SettlementRegistry::new());
//! let app = axum::Router::new().merge(handlers::routes().with_state(Arc::new(facilitator)));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod facilitator_local;
pub mod handlers;
pub mod ledger;
pub mod util;

pub use facilitator_local::*;
pub use handlers::*;
