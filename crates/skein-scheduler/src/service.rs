use crate::config::{SchedulerConfig, DEFAULT_LOCK_TTL_SECS, MANUAL_LOCK_TTL_SECS};
use crate::ops;
use crate::tracker::RunTracker;
use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::Serialize;
use skein_agent::{AgentContext, AgentRegistry};
use skein_core::{
    PipelineState, ProviderHealth, RunRecord, SkeinError, SkeinResult, TriggerSource,
};
use skein_store::LockStore;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of asking the service to run a pipeline.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The pipeline executed (possibly stopping early on a fatal error).
    Completed(PipelineReport),
    /// Another holder owned the pipeline lock; nothing was executed.
    Skipped { reason: String },
}

/// How one step of a pipeline execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// The agent executed and handed the state onward.
    Executed,
    /// The agent's `should_run` gate declined this run.
    Skipped,
    /// The agent returned a pipeline-fatal error.
    Failed,
}

/// One agent's slot in a pipeline execution.
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub agent: String,
    /// Run record written for this step; `None` for skipped steps.
    pub run_id: Option<Uuid>,
    pub outcome: StepOutcome,
}

/// What one pipeline execution did.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub trigger: TriggerSource,
    /// Per-agent outcomes, in resolved order.
    pub steps: Vec<StepReport>,
    /// Non-fatal errors recorded on the shared state.
    pub error_count: usize,
    /// The fatal error that stopped the pipeline early, if any.
    pub failure: Option<String>,
}

impl PipelineReport {
    /// Names of agents that executed, in order.
    pub fn agents_run(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Executed)
            .map(|s| s.agent.as_str())
            .collect()
    }

    /// Names of agents whose gate declined this run.
    pub fn agents_skipped(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Skipped)
            .map(|s| s.agent.as_str())
            .collect()
    }
}

/// Point-in-time snapshot of the scheduler.
#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub pipelines: Vec<PipelineStatus>,
    /// Health of every registered provider.
    pub providers: HashMap<String, ProviderHealth>,
    /// Records currently in the `running` state.
    pub active_runs: Vec<ActiveRun>,
    pub stale_timeout_minutes: i64,
}

/// A run record still open at snapshot time.
#[derive(Debug, Serialize)]
pub struct ActiveRun {
    pub id: Uuid,
    pub pipeline: String,
    pub agent_name: String,
    pub elapsed_minutes: f64,
}

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub pipeline: String,
    pub cron: String,
    pub enabled: bool,
    pub next_fire: Option<DateTime<Utc>>,
    /// Whether the pipeline lock currently has a holder.
    pub locked: bool,
}

fn lock_key(pipeline: &str) -> String {
    format!("skein:{pipeline}:lock")
}

/// Drives scheduled and manual pipeline executions.
///
/// Each configured pipeline gets its own timer loop; a separate loop sweeps
/// stale run records. Every execution path funnels through
/// [`run_pipeline`](Self::run_pipeline), which holds the pipeline lock for
/// the duration of the run so concurrent triggers of the same pipeline
/// collapse to a single execution.
pub struct SchedulerService {
    registry: Arc<AgentRegistry>,
    context: AgentContext,
    locks: Arc<dyn LockStore>,
    tracker: RunTracker,
    config: SchedulerConfig,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerService {
    pub fn new(
        registry: Arc<AgentRegistry>,
        context: AgentContext,
        locks: Arc<dyn LockStore>,
        config: SchedulerConfig,
    ) -> Self {
        let tracker = RunTracker::new(context.runs.clone());
        Self {
            registry,
            context,
            locks,
            tracker,
            config,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    ///
    /// Uses the 7-field cron format: sec min hour day-of-month month
    /// day-of-week year.
    pub fn parse_cron(cron_expr: &str) -> SkeinResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            SkeinError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// Compute the next fire time for a given cron expression.
    pub fn next_fire_time(cron_expr: &str) -> SkeinResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.upcoming(Utc).next().ok_or_else(|| {
            SkeinError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// Validate configuration and spawn the timer and sweep loops.
    ///
    /// Fails fast if any enabled entry has an invalid cron expression or
    /// names a pipeline whose agents cannot be ordered.
    pub fn start(self: &Arc<Self>) -> SkeinResult<()> {
        for entry in self.config.enabled_pipelines() {
            Self::parse_cron(&entry.cron)?;
            self.registry.resolve_dependencies(&entry.pipeline)?;
        }

        let mut handles = self.handles.lock();
        for entry in self.config.enabled_pipelines() {
            let service = Arc::clone(self);
            let entry = entry.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = match Self::next_fire_time(&entry.cron) {
                        Ok(next) => next,
                        Err(e) => {
                            warn!(pipeline = %entry.pipeline, error = %e, "Timer paused on cron error");
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            continue;
                        }
                    };
                    let now = Utc::now();
                    if next > now {
                        let wait = (next - now).to_std().unwrap_or_default();
                        tokio::time::sleep(wait).await;
                    }

                    match service
                        .run_pipeline(&entry.pipeline, TriggerSource::Scheduled, HashMap::new())
                        .await
                    {
                        Ok(PipelineOutcome::Completed(report)) => {
                            info!(
                                pipeline = %report.pipeline,
                                agents_run = report.agents_run().len(),
                                errors = report.error_count,
                                "Scheduled run finished"
                            );
                        }
                        Ok(PipelineOutcome::Skipped { reason }) => {
                            info!(pipeline = %entry.pipeline, %reason, "Scheduled run skipped");
                        }
                        Err(e) => {
                            error!(pipeline = %entry.pipeline, error = %e, "Scheduled run errored");
                        }
                    }
                }
            }));
        }

        let service = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sweep_interval_secs);
        handles.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = service.sweep_stale_runs().await {
                    error!(error = %e, "Stale-run sweep errored");
                }
            }
        }));

        info!(
            pipelines = self.config.enabled_pipelines().len(),
            sweep_interval_secs = self.config.sweep_interval_secs,
            "Scheduler started"
        );
        Ok(())
    }

    /// Abort all background loops. Runs already in flight are not
    /// interrupted; their records close normally or via the next sweep.
    pub fn stop(&self) {
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            handle.abort();
        }
        info!("Scheduler stopped");
    }

    /// Execute one pipeline under its lock.
    ///
    /// Returns `Skipped` without touching any state when the lock is
    /// already held. The lock is released on every exit path; its TTL only
    /// matters if this process dies mid-run.
    pub async fn run_pipeline(
        &self,
        pipeline: &str,
        trigger: TriggerSource,
        params: HashMap<String, serde_json::Value>,
    ) -> SkeinResult<PipelineOutcome> {
        let order = self.registry.resolve_dependencies(pipeline)?;

        let ttl_secs = match trigger {
            TriggerSource::Manual => MANUAL_LOCK_TTL_SECS,
            TriggerSource::Scheduled => self
                .config
                .schedule_for(pipeline)
                .map(|entry| entry.lock_ttl_secs)
                .unwrap_or(DEFAULT_LOCK_TTL_SECS),
        };

        let key = lock_key(pipeline);
        if !self.locks.try_acquire(&key, Duration::from_secs(ttl_secs)).await? {
            return Ok(PipelineOutcome::Skipped {
                reason: format!("pipeline '{pipeline}' skipped, already running"),
            });
        }

        let result = self.execute(pipeline, trigger, params, order).await;
        if let Err(e) = self.locks.release(&key).await {
            warn!(pipeline = %pipeline, error = %e, "Failed to release pipeline lock");
        }
        result.map(PipelineOutcome::Completed)
    }

    async fn execute(
        &self,
        pipeline: &str,
        trigger: TriggerSource,
        params: HashMap<String, serde_json::Value>,
        order: Vec<Arc<dyn skein_agent::Agent>>,
    ) -> SkeinResult<PipelineReport> {
        info!(pipeline = %pipeline, trigger = %trigger, agents = order.len(), "Pipeline starting");

        let mut state = PipelineState::new(trigger);
        state.trigger_params = params;

        let mut steps = Vec::new();
        let mut error_count = 0;
        let mut failure = None;

        for agent in order {
            let name = agent.name().to_string();
            if !agent.should_run(&state).await {
                info!(pipeline = %pipeline, agent = %name, "Agent declined this run");
                steps.push(StepReport {
                    agent: name,
                    run_id: None,
                    outcome: StepOutcome::Skipped,
                });
                continue;
            }

            let ctx = self.context.clone();
            let worker = agent.clone();
            let (run_id, result) = self
                .tracker
                .track(pipeline, &name, state, move |s| async move {
                    worker.process(s, &ctx).await
                })
                .await;
            state = match result {
                Ok(next_state) => next_state,
                Err(e) => {
                    // Pipeline-fatal: downstream agents do not run.
                    failure = Some(e.to_string());
                    steps.push(StepReport {
                        agent: name,
                        run_id: Some(run_id),
                        outcome: StepOutcome::Failed,
                    });
                    break;
                }
            };
            error_count = state.error_count();
            steps.push(StepReport {
                agent: name,
                run_id: Some(run_id),
                outcome: StepOutcome::Executed,
            });
        }

        Ok(PipelineReport {
            pipeline: pipeline.to_string(),
            trigger,
            steps,
            error_count,
            failure,
        })
    }

    /// Run a pipeline on demand. Uses the longer manual lock TTL.
    pub async fn trigger_pipeline(
        &self,
        pipeline: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> SkeinResult<PipelineOutcome> {
        self.run_pipeline(pipeline, TriggerSource::Manual, params).await
    }

    /// Close one still-running record as cancelled.
    pub async fn cancel_run(&self, id: Uuid) -> SkeinResult<RunRecord> {
        ops::cancel_run(self.context.runs.as_ref(), id).await
    }

    /// Force-fail records stuck in `running` past the configured timeout.
    pub async fn sweep_stale_runs(&self) -> SkeinResult<usize> {
        ops::sweep_stale_runs(self.context.runs.as_ref(), self.config.stale_after_minutes).await
    }

    /// Most recent run records, newest first.
    pub async fn recent_runs(&self, limit: usize) -> SkeinResult<Vec<RunRecord>> {
        self.context.runs.recent(limit).await
    }

    /// Snapshot of configured pipelines, provider health, and open runs.
    pub async fn status(&self) -> SkeinResult<SchedulerStatus> {
        let mut pipelines = Vec::new();
        for entry in &self.config.pipelines {
            pipelines.push(PipelineStatus {
                pipeline: entry.pipeline.clone(),
                cron: entry.cron.clone(),
                enabled: entry.enabled,
                next_fire: Self::next_fire_time(&entry.cron).ok(),
                locked: self.locks.is_held(&lock_key(&entry.pipeline)).await?,
            });
        }

        let now = Utc::now();
        let active_runs = self
            .context
            .runs
            .running()
            .await?
            .into_iter()
            .map(|record| ActiveRun {
                id: record.id,
                pipeline: record.pipeline.clone(),
                agent_name: record.agent_name.clone(),
                elapsed_minutes: record.elapsed_minutes(now),
            })
            .collect();

        Ok(SchedulerStatus {
            pipelines,
            providers: self.context.providers.health_check_all().await,
            active_runs,
            stale_timeout_minutes: self.config.stale_after_minutes,
        })
    }
}
