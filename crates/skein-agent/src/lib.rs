//! Agent contract and registry for the Skein orchestrator.
//!
//! An agent is one unit of pipeline work: it declares which pipeline it
//! belongs to, which agents in that pipeline must run before it, and which
//! providers it needs, then transforms the shared [`PipelineState`] when its
//! turn comes. The registry resolves the declared dependencies into a
//! deterministic execution order.
//!
//! # Main types
//!
//! - [`Agent`] — Contract each pipeline step implements.
//! - [`AgentContext`] — Shared handles passed into every `process` call.
//! - [`AgentRegistry`] — Registration, lookup, and dependency resolution.
//!
//! [`PipelineState`]: skein_core::PipelineState

/// Agent contract and the context handed to `process`.
pub mod contract;
/// Agent registry with dependency resolution and validation.
pub mod registry;

pub use contract::{Agent, AgentContext};
pub use registry::AgentRegistry;
