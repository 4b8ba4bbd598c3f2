//! Utility modules for the nexus-facilitator-local crate.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`sig_down`] | Graceful shutdown signal handling |
//! | [`telemetry`] | `tracing` subscriber setup, with OpenTelemetry export under the `telemetry` feature |

pub mod sig_down;
pub mod telemetry;

pub use sig_down::*;
pub use telemetry::*;
