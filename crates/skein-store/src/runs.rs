use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skein_core::{RunRecord, RunStatus, SkeinError, SkeinResult};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Storage seam for run lifecycle records.
///
/// The orchestration core only needs insert-on-start, update-on-completion,
/// a couple of read paths, and the stale-run sweep.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a freshly started record.
    async fn insert(&self, record: &RunRecord) -> SkeinResult<()>;

    /// Overwrite an existing record (completion, cancellation).
    async fn update(&self, record: &RunRecord) -> SkeinResult<()>;

    /// Fetch one record by id.
    async fn get(&self, id: Uuid) -> SkeinResult<Option<RunRecord>>;

    /// Most recent records, newest first.
    async fn recent(&self, limit: usize) -> SkeinResult<Vec<RunRecord>>;

    /// All records still in the `Running` state, newest first.
    async fn running(&self) -> SkeinResult<Vec<RunRecord>>;

    /// Force-fail every record still `Running` whose start time is older
    /// than `cutoff`. Returns how many records were closed; repeating the
    /// sweep with the same cutoff closes nothing further.
    async fn fail_stale(&self, cutoff: DateTime<Utc>, summary: &str) -> SkeinResult<usize>;
}

/// In-memory run store for tests and single-process embedding.
pub struct MemoryRunStore {
    records: RwLock<Vec<RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert(&self, record: &RunRecord) -> SkeinResult<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(SkeinError::Store(format!(
                "run '{}' already exists",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &RunRecord) -> SkeinResult<()> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(SkeinError::Store(format!("run '{}' not found", record.id))),
        }
    }

    async fn get(&self, id: Uuid) -> SkeinResult<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn recent(&self, limit: usize) -> SkeinResult<Vec<RunRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<RunRecord> = records.clone();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn running(&self) -> SkeinResult<Vec<RunRecord>> {
        let records = self.records.read().await;
        let mut running: Vec<RunRecord> = records
            .iter()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(running)
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, summary: &str) -> SkeinResult<usize> {
        let mut records = self.records.write().await;
        let mut closed = 0;
        for record in records.iter_mut() {
            if record.status == RunStatus::Running && record.started_at < cutoff {
                warn!(
                    run_id = %record.id,
                    pipeline = %record.pipeline,
                    agent = %record.agent_name,
                    "Closing stale run"
                );
                record.status = RunStatus::Failed;
                record.completed_at = Some(Utc::now());
                record.summary = Some(summary.to_string());
                record.errors_count = record.errors_count.max(1);
                closed += 1;
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use skein_core::TriggerSource;

    fn record(pipeline: &str, agent: &str) -> RunRecord {
        RunRecord::started(pipeline, agent, TriggerSource::Scheduled)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryRunStore::new();
        let r = record("sync", "item_sync");
        store.insert(&r).await.unwrap();

        let fetched = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(fetched.agent_name, "item_sync");
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryRunStore::new();
        let r = record("sync", "item_sync");
        store.insert(&r).await.unwrap();
        assert!(store.insert(&r).await.is_err());
    }

    #[tokio::test]
    async fn test_update_roundtrip() {
        let store = MemoryRunStore::new();
        let mut r = record("sync", "item_sync");
        store.insert(&r).await.unwrap();

        r.status = RunStatus::Completed;
        r.summary = Some("2 new".to_string());
        store.update(&r).await.unwrap();

        let fetched = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Completed);
        assert_eq!(fetched.summary.as_deref(), Some("2 new"));
    }

    #[tokio::test]
    async fn test_update_missing_errors() {
        let store = MemoryRunStore::new();
        let r = record("sync", "ghost");
        assert!(store.update(&r).await.is_err());
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let store = MemoryRunStore::new();
        for i in 0..5 {
            let mut r = record("sync", &format!("agent_{i}"));
            r.started_at = Utc::now() - chrono::Duration::minutes(5 - i);
            store.insert(&r).await.unwrap();
        }

        let recent = store.recent(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].agent_name, "agent_4");
        assert!(recent[0].started_at > recent[1].started_at);
    }

    #[tokio::test]
    async fn test_fail_stale_is_idempotent() {
        let store = MemoryRunStore::new();

        let mut stale = record("sync", "stuck");
        stale.started_at = Utc::now() - chrono::Duration::minutes(30);
        store.insert(&stale).await.unwrap();

        let fresh = record("sync", "live");
        store.insert(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        assert_eq!(
            store.fail_stale(cutoff, "Timed out after 10 minutes").await.unwrap(),
            1
        );
        // Second sweep closes nothing further.
        assert_eq!(
            store.fail_stale(cutoff, "Timed out after 10 minutes").await.unwrap(),
            0
        );

        let stuck = store.get(stale.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, RunStatus::Failed);
        assert_eq!(stuck.summary.as_deref(), Some("Timed out after 10 minutes"));
        assert_eq!(stuck.errors_count, 1);

        let live = store.get(fresh.id).await.unwrap().unwrap();
        assert_eq!(live.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_running_filter() {
        let store = MemoryRunStore::new();
        let mut done = record("sync", "done");
        done.status = RunStatus::Completed;
        store.insert(&done).await.unwrap();
        store.insert(&record("sync", "busy")).await.unwrap();

        let running = store.running().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].agent_name, "busy");
    }
}
