//! Core types and error definitions for the Skein pipeline orchestrator.
//!
//! This crate provides the foundational types shared across all Skein crates:
//! the error enum, the mutable state threaded through a pipeline run, the
//! persisted run record, and the descriptors used at the provider seam.
//!
//! # Main types
//!
//! - [`SkeinError`] — Unified error enum for all Skein subsystems.
//! - [`SkeinResult`] — Convenience alias for `Result<T, SkeinError>`.
//! - [`PipelineState`] — Shared state flowing through the agents of one run.
//! - [`RunRecord`] — The persisted audit row for one agent execution.
//! - [`TriggerSource`] / [`RunStatus`] — Run lifecycle enums.
//! - [`ProviderHealth`] / [`AuthMode`] / [`CapabilityDescriptor`] — Provider
//!   contract vocabulary.

/// Provider-contract vocabulary (health, auth, capability descriptors).
pub mod provider;
/// Persisted run lifecycle records.
pub mod run;
/// Mutable state threaded through a pipeline run.
pub mod state;

pub use provider::{AuthMode, CapabilityDescriptor, ProviderHealth};
pub use run::{RunRecord, RunStatus, TriggerSource};
pub use state::{PipelineState, StateError};

// --- Error types ---

/// Top-level error type for the Skein orchestrator.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum SkeinError {
    /// A configuration problem: duplicate names, unresolved dependencies,
    /// dependency cycles, invalid cron expressions. Fatal at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// An error escaping an agent's `process` call (pipeline-fatal).
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error raised by an external provider integration.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An error from the run-record store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error from the distributed lock store.
    #[error("Lock error: {0}")]
    Lock(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SkeinError`].
pub type SkeinResult<T> = Result<T, SkeinError>;
