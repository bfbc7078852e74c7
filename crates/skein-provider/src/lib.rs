//! Provider abstraction for external integrations.
//!
//! A provider wraps one external data source (networked API, local cache)
//! behind a uniform capability-invocation interface, so agents never know
//! which concrete source answered. The composite provider adds transparent
//! primary→secondary failover on top of the same contract.
//!
//! # Main types
//!
//! - [`Provider`] — The contract every integration implements.
//! - [`ProviderRegistry`] — Named provider instances with bulk health checks.
//! - [`CompositeProvider`] — Primary/secondary failover behind one name.

/// Primary/secondary failover provider.
pub mod composite;
/// The provider contract.
pub mod contract;
/// Named provider registry.
pub mod registry;

pub use composite::{CompositeProvider, SourceLabel};
pub use contract::Provider;
pub use registry::ProviderRegistry;
