use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What started a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Fired by the scheduler's timer.
    Scheduled,
    /// Requested on demand through the front-door API.
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TriggerSource::Scheduled),
            "manual" => Ok(TriggerSource::Manual),
            other => Err(format!("unknown trigger source '{other}'")),
        }
    }
}

/// Lifecycle status of a run record.
///
/// Transitions are monotonic: `Running` moves to exactly one of
/// `Completed` or `Failed` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether the status is terminal (completed or failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// The persisted audit row describing one agent execution.
///
/// Inserted with status `Running` before the agent starts and updated once
/// when it finishes. A record left `Running` past the stale-run timeout is
/// force-failed by the sweep, so no run stays open forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub pipeline: String,
    pub agent_name: String,
    pub trigger: TriggerSource,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub items_processed: u64,
    pub entities_found: u64,
    pub errors_count: u64,
    pub summary: Option<String>,
}

impl RunRecord {
    /// Create a fresh record in the `Running` state.
    pub fn started(
        pipeline: impl Into<String>,
        agent_name: impl Into<String>,
        trigger: TriggerSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            agent_name: agent_name.into(),
            trigger,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            items_processed: 0,
            entities_found: 0,
            errors_count: 0,
            summary: None,
        }
    }

    /// Minutes elapsed since the run started.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_seconds() as f64 / 60.0
    }
}
