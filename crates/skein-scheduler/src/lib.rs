//! Scheduling and run-lifecycle orchestration for Skein.
//!
//! This crate owns everything between "a timer fired or an operator asked"
//! and "agents ran and their records were written": the cron-driven
//! [`SchedulerService`], the per-agent [`RunTracker`] bookkeeping, the
//! pipeline lock discipline, and the maintenance operations (cancellation,
//! stale-run sweep) shared with the CLI.
//!
//! # Main types
//!
//! - [`SchedulerService`] — Timer loops, locking, pipeline execution.
//! - [`RunTracker`] — Insert-before / update-after record bookkeeping.
//! - [`SchedulerConfig`] / [`PipelineSchedule`] — Timer configuration.
//! - [`PipelineOutcome`] / [`PipelineReport`] — What an execution did.

/// Timer configuration and lock TTL constants.
pub mod config;
/// Run maintenance operations shared with the CLI.
pub mod ops;
/// The scheduler service and pipeline execution.
pub mod service;
/// Per-agent run-record bookkeeping.
pub mod tracker;

pub use config::{
    PipelineSchedule, SchedulerConfig, DEFAULT_LOCK_TTL_SECS, MANUAL_LOCK_TTL_SECS,
    STALE_RUN_TIMEOUT_MINUTES,
};
pub use service::{
    ActiveRun, PipelineOutcome, PipelineReport, PipelineStatus, SchedulerService,
    SchedulerStatus, StepOutcome, StepReport,
};
pub use tracker::RunTracker;
