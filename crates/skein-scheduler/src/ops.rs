//! Run maintenance operations shared by the scheduler service and the CLI.

use chrono::Utc;
use skein_core::{RunRecord, RunStatus, SkeinError, SkeinResult};
use skein_store::RunStore;
use tracing::info;
use uuid::Uuid;

/// Mark one still-running record as failed with a cancellation note.
///
/// Cancellation is record-level: it closes the audit row but does not
/// interrupt an agent that is mid-flight. Errors if the run does not exist
/// or already reached a terminal status.
pub async fn cancel_run(runs: &dyn RunStore, id: Uuid) -> SkeinResult<RunRecord> {
    let mut record = runs
        .get(id)
        .await?
        .ok_or_else(|| SkeinError::Store(format!("run '{id}' not found")))?;

    if record.status.is_terminal() {
        return Err(SkeinError::Store(format!(
            "run '{id}' is already {}",
            record.status
        )));
    }

    let now = Utc::now();
    record.status = RunStatus::Failed;
    record.summary = Some("Cancelled by user".to_string());
    record.errors_count += 1;
    record.completed_at = Some(now);
    record.duration_ms = Some((now - record.started_at).num_milliseconds().max(0) as u64);
    runs.update(&record).await?;

    info!(run = %id, agent = %record.agent_name, "Run cancelled");
    Ok(record)
}

/// Force-fail every record left `running` longer than `timeout_minutes`.
///
/// Returns how many records were closed. Safe to call repeatedly; a second
/// sweep with the same cutoff closes nothing further.
pub async fn sweep_stale_runs(runs: &dyn RunStore, timeout_minutes: i64) -> SkeinResult<usize> {
    let cutoff = Utc::now() - chrono::Duration::minutes(timeout_minutes);
    let summary = format!("Timed out after {timeout_minutes} minutes");
    let closed = runs.fail_stale(cutoff, &summary).await?;
    if closed > 0 {
        info!(closed, timeout_minutes, "Closed stale runs");
    }
    Ok(closed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use skein_core::TriggerSource;
    use skein_store::MemoryRunStore;

    #[tokio::test]
    async fn test_cancel_running_record() {
        let store = MemoryRunStore::new();
        let record = RunRecord::started("sync", "item_sync", TriggerSource::Manual);
        store.insert(&record).await.unwrap();

        let cancelled = cancel_run(&store, record.id).await.unwrap();
        assert_eq!(cancelled.status, RunStatus::Failed);
        assert_eq!(cancelled.summary.as_deref(), Some("Cancelled by user"));
        assert_eq!(cancelled.errors_count, 1);
        assert!(cancelled.completed_at.is_some());
        assert!(cancelled.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_cancel_terminal_record_errors() {
        let store = MemoryRunStore::new();
        let mut record = RunRecord::started("sync", "item_sync", TriggerSource::Manual);
        record.status = RunStatus::Completed;
        store.insert(&record).await.unwrap();

        assert!(cancel_run(&store, record.id).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_missing_record_errors() {
        let store = MemoryRunStore::new();
        assert!(cancel_run(&store, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_closes_only_stale() {
        let store = MemoryRunStore::new();
        let mut stale = RunRecord::started("sync", "stuck", TriggerSource::Scheduled);
        stale.started_at = Utc::now() - chrono::Duration::minutes(25);
        store.insert(&stale).await.unwrap();
        store
            .insert(&RunRecord::started("sync", "live", TriggerSource::Scheduled))
            .await
            .unwrap();

        assert_eq!(sweep_stale_runs(&store, 10).await.unwrap(), 1);
        assert_eq!(sweep_stale_runs(&store, 10).await.unwrap(), 0);

        let closed = store.get(stale.id).await.unwrap().unwrap();
        assert_eq!(closed.status, RunStatus::Failed);
        assert_eq!(closed.summary.as_deref(), Some("Timed out after 10 minutes"));
    }
}
