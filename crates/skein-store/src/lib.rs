//! Persistence boundaries for the Skein orchestrator.
//!
//! Two seams live here: the run-record store (insert-on-start,
//! update-on-completion, plus the stale-run query) and the distributed lock
//! store (atomic set-if-absent-with-expiry). Each has a sqlite backend for
//! durable cross-process use and an in-memory backend for embedding and
//! tests.
//!
//! # Main types
//!
//! - [`RunStore`] / [`SqliteRunStore`] / [`MemoryRunStore`]
//! - [`LockStore`] / [`SqliteLockStore`] / [`MemoryLockStore`]

/// Distributed lock seam and in-memory backend.
pub mod locks;
/// Run-record seam and in-memory backend.
pub mod runs;
/// Durable sqlite backends for both seams.
pub mod sqlite;

pub use locks::{LockStore, MemoryLockStore};
pub use runs::{MemoryRunStore, RunStore};
pub use sqlite::{SqliteLockStore, SqliteRunStore};
