use skein_core::{PipelineState, RunRecord, RunStatus, SkeinResult};
use skein_store::RunStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Counter keys that count as forward progress when deciding whether a run
/// with recorded errors still completed.
const PROGRESS_KEYS: &[&str] = &["new", "updated", "processed", "items_processed"];

/// Counter key agents use to report how many entities a run surfaced.
const ENTITIES_KEY: &str = "entities_found";

/// Wraps one agent execution in run-record bookkeeping.
///
/// A record is inserted with status `running` before the agent starts and
/// updated exactly once when it finishes, whatever the outcome, so the run
/// history never shows an agent that executed without a record.
pub struct RunTracker {
    runs: Arc<dyn RunStore>,
}

impl RunTracker {
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self { runs }
    }

    /// Execute `work` for one agent and persist the surrounding record.
    ///
    /// Returns the run record's id alongside the outcome, so callers can
    /// report which audit row belongs to which step.
    ///
    /// Outcome mapping:
    /// - `Ok` with no new errors, or with new errors alongside progress on
    ///   any of the progress counters: `completed`.
    /// - `Ok` with new errors and zero progress: `failed`.
    /// - `Err`: `failed` with summary `Error: {e}`; the error is handed
    ///   back unchanged so the rest of the pipeline stops.
    ///
    /// Counter and error deltas are measured against the incoming state, so
    /// an agent is only ever credited with its own work.
    pub async fn track<F, Fut>(
        &self,
        pipeline: &str,
        agent_name: &str,
        state: PipelineState,
        work: F,
    ) -> (Uuid, SkeinResult<PipelineState>)
    where
        F: FnOnce(PipelineState) -> Fut,
        Fut: Future<Output = SkeinResult<PipelineState>>,
    {
        let mut record = RunRecord::started(pipeline, agent_name, state.trigger);
        let run_id = record.id;
        if let Err(e) = self.runs.insert(&record).await {
            return (run_id, Err(e));
        }

        let errors_before = state.error_count();
        let counters_before = state.counters().clone();
        let started = Instant::now();

        let outcome = match work(state).await {
            Ok(new_state) => {
                let elapsed = started.elapsed();
                let new_errors = new_state.error_count().saturating_sub(errors_before);
                let deltas = counter_deltas(&counters_before, new_state.counters());
                let progress: u64 = PROGRESS_KEYS
                    .iter()
                    .filter_map(|key| deltas.get(*key))
                    .sum();

                record.items_processed = progress;
                record.entities_found = deltas.get(ENTITIES_KEY).copied().unwrap_or(0);
                record.errors_count = new_errors as u64;
                record.status = if new_errors > 0 && progress == 0 {
                    RunStatus::Failed
                } else {
                    RunStatus::Completed
                };
                record.summary = Some(build_summary(&deltas, new_errors));
                record.completed_at = Some(chrono::Utc::now());
                record.duration_ms = Some(elapsed.as_millis() as u64);
                // Can overwrite a sweep's timeout verdict when the run
                // outlived the stale threshold but still finished.
                if let Err(e) = self.runs.update(&record).await {
                    return (run_id, Err(e));
                }

                info!(
                    pipeline = %pipeline,
                    agent = %agent_name,
                    status = %record.status,
                    duration_ms = record.duration_ms.unwrap_or(0),
                    summary = record.summary.as_deref().unwrap_or(""),
                    "Agent run finished"
                );
                Ok(new_state)
            }
            Err(e) => {
                let elapsed = started.elapsed();
                record.status = RunStatus::Failed;
                record.errors_count = 1;
                record.summary = Some(format!("Error: {e}"));
                record.completed_at = Some(chrono::Utc::now());
                record.duration_ms = Some(elapsed.as_millis() as u64);
                if let Err(store_err) = self.runs.update(&record).await {
                    warn!(
                        pipeline = %pipeline,
                        agent = %agent_name,
                        error = %store_err,
                        "Failed to persist run failure"
                    );
                }

                error!(
                    pipeline = %pipeline,
                    agent = %agent_name,
                    error = %e,
                    "Agent run failed"
                );
                Err(e)
            }
        };
        (run_id, outcome)
    }
}

fn counter_deltas(
    before: &HashMap<String, u64>,
    after: &HashMap<String, u64>,
) -> HashMap<String, u64> {
    after
        .iter()
        .filter_map(|(key, value)| {
            let delta = value.saturating_sub(before.get(key).copied().unwrap_or(0));
            (delta > 0).then(|| (key.clone(), delta))
        })
        .collect()
}

/// Human summary in the shape "3 new, 1 updated, 2 error(s)".
fn build_summary(deltas: &HashMap<String, u64>, new_errors: usize) -> String {
    let mut parts: Vec<String> = PROGRESS_KEYS
        .iter()
        .filter_map(|key| deltas.get(*key).map(|n| format!("{n} {key}")))
        .collect();
    if let Some(n) = deltas.get(ENTITIES_KEY) {
        parts.push(format!("{n} entities found"));
    }
    if new_errors > 0 {
        parts.push(format!("{new_errors} error(s)"));
    }
    if parts.is_empty() {
        "No changes".to_string()
    } else {
        parts.join(", ")
    }
}
