//! Nexus facilitator HTTP entrypoint.
//!
//! Launches an Axum server that keeps per-wallet virtual balances, credits
//! on-chain deposits, pays x402 providers out of those balances and lists
//! providers from the on-chain service registry.
//!
//! Endpoints:
//! - `GET /health` – Liveness check
//! - `GET /balance/{wallet}` – Balances on every supported chain
//! - `GET /balance/{wallet}/{chainId}` – Balance on one chain
//! - `POST /deposit` – Credit a confirmed on-chain deposit
//! - `POST /pay` – Debit a balance and settle with a provider
//! - `GET /transactions/{wallet}` – Journal entries, newest first
//! - `GET /supported-chains` – Chains the server settles on
//! - `GET /services` – Providers by category, ranked by reputation
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `MASTER_WALLET_PRIVATE_KEY` enables on-chain settlement (demo mode otherwise)
//! - `DATABASE_URL` selects the Postgres ledger (requires the `postgres` feature)
//! - `REGISTRY_ADDRESS` enables live service discovery
//! - `OTEL_*` variables enable tracing export (requires the `telemetry` feature)

mod chain;
mod config;
mod discovery;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
