//! Service discovery for Nexus.
//!
//! Providers of payment-gated data register in the `NexusRegistry` contract
//! with a category, a price and a reputation score. [`ServiceRegistry`] looks
//! up a category, keeps offerings priced at or below a maximum and ranks them
//! by reputation.
//!
//! Lookups never fail outright. Without a configured registry, for a chain
//! the registry is not deployed on, or when the contract call fails, the
//! result comes from a built-in [`catalog`] and is flagged with
//! [`DiscoverySource::Fallback`] and a [`FallbackReason`].
//!
//! ```ignore
//! use nexus_registry::{ServiceQuery, ServiceRegistry};
//!
//! let registry = ServiceRegistry::connect(address, chains.iter())?;
//! let discovery = registry.find_services(&ServiceQuery::default()).await;
//! for offering in discovery.services {
//!     println!("{} {}", offering.endpoint, offering.price_formatted);
//! }
//! ```

pub mod catalog;
pub mod contract;
pub mod offering;
pub mod registry;

pub use offering::*;
pub use registry::*;
