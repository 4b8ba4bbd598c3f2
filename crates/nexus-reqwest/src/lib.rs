#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Pay-per-request HTTP for [x402](https://www.x402.org) resources, settled by
//! a Nexus facilitator.
//!
//! A resource server that wants payment answers `402 Payment Required` with
//! its terms. [`X402Client`] reads the terms, asks a
//! [`Facilitator`](nexus_types::facilitator::Facilitator) to pay them out of
//! the wallet's virtual balance, and retries the request once with the
//! settlement hash as proof.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use nexus_reqwest::{FacilitatorClient, X402Client};
//!
//! let facilitator = FacilitatorClient::try_from("http://localhost:3001")?;
//! let client = X402Client::new(facilitator, "0xabc...".parse()?);
//! let unlocked = client.get("https://data.example.org/api/news/crypto").await?;
//! println!("paid {} wei in {:?}", unlocked.cost, unlocked.tx_hash);
//! ```
//!
//! ## Failure stages
//!
//! Every [`X402Error`] reports a [`PaymentStage`]. Once a payment went through
//! the funds have moved, so `PaidButLocked` errors carry the
//! [`PaymentReceipt`] and are never retried automatically.
//!
//! For code that already uses `reqwest_middleware`, [`X402Payments`] does the
//! same challenge, pay and retry cycle as a middleware.

pub mod challenge;
mod client;
mod facilitator_client;
mod middleware;

pub use challenge::{ChallengeError, parse_challenge};
pub use client::*;
pub use facilitator_client::*;
pub use middleware::*;
