use crate::run::TriggerSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single recorded failure inside an agent's `process` call.
///
/// Per-item failures are recorded here instead of aborting the pipeline,
/// so one bad item never blocks unrelated items in the same batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateError {
    /// Name of the agent that recorded the failure.
    pub agent: String,
    /// Identifier of the item that failed, if the failure was per-item.
    pub item: Option<String>,
    /// Human-readable failure message.
    pub message: String,
}

/// Shared state threaded through every agent of one pipeline run.
///
/// Created fresh at pipeline start, passed by value through each agent in
/// the resolved order, and discarded after the run; only the per-agent
/// [`RunRecord`](crate::RunRecord)s are persisted. The state is owned by
/// exactly one run at a time and never shared across runs or processes.
///
/// The error list is append-only: agents can record failures but never
/// remove what earlier agents reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// What started this run (timer or manual trigger).
    pub trigger: TriggerSource,
    /// Free-form parameters supplied by a manual trigger.
    #[serde(default)]
    pub trigger_params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    values: HashMap<String, serde_json::Value>,
    #[serde(default)]
    counters: HashMap<String, u64>,
    #[serde(default)]
    errors: Vec<StateError>,
}

impl PipelineState {
    /// Create an empty state for a new run.
    pub fn new(trigger: TriggerSource) -> Self {
        Self {
            trigger,
            trigger_params: HashMap::new(),
            values: HashMap::new(),
            counters: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Store a pipeline-specific value (e.g. a list of newly seen item ids).
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    /// Read back a pipeline-specific value.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Add `n` to a named progress counter.
    pub fn add_count(&mut self, key: impl Into<String>, n: u64) {
        *self.counters.entry(key.into()).or_insert(0) += n;
    }

    /// Current value of a progress counter (0 if never touched).
    pub fn count(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// All progress counters.
    pub fn counters(&self) -> &HashMap<String, u64> {
        &self.counters
    }

    /// Record a pipeline-level failure attributed to `agent`.
    pub fn record_error(&mut self, agent: impl Into<String>, message: impl Into<String>) {
        self.errors.push(StateError {
            agent: agent.into(),
            item: None,
            message: message.into(),
        });
    }

    /// Record a per-item failure attributed to `agent`.
    pub fn record_item_error(
        &mut self,
        agent: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors.push(StateError {
            agent: agent.into(),
            item: Some(item.into()),
            message: message.into(),
        });
    }

    /// All failures recorded so far, in insertion order.
    pub fn errors(&self) -> &[StateError] {
        &self.errors
    }

    /// Number of failures recorded so far.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
