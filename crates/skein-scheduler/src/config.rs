use serde::{Deserialize, Serialize};

/// Lock TTL for scheduled runs when a pipeline entry does not override it.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;

/// Lock TTL for manual triggers. Longer than the scheduled TTL so an
/// operator-initiated run is not evicted under a timer-tuned expiry.
pub const MANUAL_LOCK_TTL_SECS: u64 = 600;

/// Minutes a record may stay `running` before the sweep force-fails it.
pub const STALE_RUN_TIMEOUT_MINUTES: i64 = 10;

/// One pipeline's timer entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSchedule {
    /// Pipeline name; must match the agents' declared pipeline.
    pub pipeline: String,
    /// 7-field cron expression: sec min hour day-of-month month day-of-week year.
    pub cron: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lock TTL for scheduled runs of this pipeline, in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_TTL_SECS
}

/// Scheduler-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub pipelines: Vec<PipelineSchedule>,
    /// How often the stale-run sweep fires, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Age threshold for the sweep, in minutes.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_stale_after_minutes() -> i64 {
    STALE_RUN_TIMEOUT_MINUTES
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pipelines: Vec::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

impl SchedulerConfig {
    /// Look up the schedule entry for a pipeline, if one is configured.
    pub fn schedule_for(&self, pipeline: &str) -> Option<&PipelineSchedule> {
        self.pipelines.iter().find(|s| s.pipeline == pipeline)
    }

    /// Enabled entries only.
    pub fn enabled_pipelines(&self) -> Vec<&PipelineSchedule> {
        self.pipelines.iter().filter(|s| s.enabled).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        let config: SchedulerConfig = serde_json::from_str(
            r#"{"pipelines": [{"pipeline": "sync", "cron": "0 */15 * * * * *"}]}"#,
        )
        .unwrap();

        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.stale_after_minutes, 10);
        let entry = config.schedule_for("sync").unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.lock_ttl_secs, DEFAULT_LOCK_TTL_SECS);
    }

    #[test]
    fn test_enabled_filter() {
        let config: SchedulerConfig = serde_json::from_str(
            r#"{"pipelines": [
                {"pipeline": "sync", "cron": "0 * * * * * *"},
                {"pipeline": "briefing", "cron": "0 0 7 * * * *", "enabled": false}
            ]}"#,
        )
        .unwrap();

        let enabled = config.enabled_pipelines();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].pipeline, "sync");
    }
}
