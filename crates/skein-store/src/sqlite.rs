use crate::locks::LockStore;
use crate::runs::RunStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use skein_core::{RunRecord, RunStatus, SkeinError, SkeinResult, TriggerSource};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const RUNS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agent_runs (
    id TEXT PRIMARY KEY,
    pipeline TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    trigger_source TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running'
        CHECK (status IN ('running', 'completed', 'failed')),
    items_processed INTEGER NOT NULL DEFAULT 0,
    entities_found INTEGER NOT NULL DEFAULT 0,
    errors_count INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER,
    summary TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_agent_runs_started_at ON agent_runs(started_at);
CREATE INDEX IF NOT EXISTS idx_agent_runs_status ON agent_runs(status);
";

const LOCKS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pipeline_locks (
    key TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
";

/// Fixed-width UTC timestamps so string comparison in SQL matches time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn open_connection(path: &Path) -> SkeinResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)
        .map_err(|e| SkeinError::Store(format!("failed to open database: {e}")))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| SkeinError::Store(format!("failed to set pragmas: {e}")))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| SkeinError::Store(format!("failed to set busy timeout: {e}")))?;
    Ok(conn)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let id: String = row.get(0)?;
    let trigger: String = row.get(3)?;
    let status: String = row.get(4)?;
    let started_at: String = row.get(10)?;
    let completed_at: Option<String> = row.get(11)?;

    let conversion = |column: usize, e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            e.into(),
        )
    };

    Ok(RunRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| conversion(0, e.to_string()))?,
        pipeline: row.get(1)?,
        agent_name: row.get(2)?,
        trigger: TriggerSource::from_str(&trigger).map_err(|e| conversion(3, e))?,
        status: RunStatus::from_str(&status).map_err(|e| conversion(4, e))?,
        items_processed: row.get::<_, i64>(5)? as u64,
        entities_found: row.get::<_, i64>(6)? as u64,
        errors_count: row.get::<_, i64>(7)? as u64,
        duration_ms: row.get::<_, Option<i64>>(8)?.map(|ms| ms as u64),
        summary: row.get(9)?,
        started_at: parse_ts(10, &started_at)?,
        completed_at: completed_at.as_deref().map(|s| parse_ts(11, s)).transpose()?,
    })
}

const SELECT_COLUMNS: &str = "id, pipeline, agent_name, trigger_source, status, \
     items_processed, entities_found, errors_count, duration_ms, summary, \
     started_at, completed_at";

/// Durable run store backed by sqlite (WAL mode).
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    pub fn open(path: impl AsRef<Path>) -> SkeinResult<Self> {
        let conn = open_connection(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> SkeinResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SkeinError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> SkeinResult<Self> {
        conn.execute_batch(RUNS_SCHEMA)
            .map_err(|e| SkeinError::Store(format!("failed to create run schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn insert(&self, record: &RunRecord) -> SkeinResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO agent_runs (id, pipeline, agent_name, trigger_source, status, \
             items_processed, entities_found, errors_count, duration_ms, summary, \
             started_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id.to_string(),
                record.pipeline,
                record.agent_name,
                record.trigger.as_str(),
                record.status.as_str(),
                record.items_processed as i64,
                record.entities_found as i64,
                record.errors_count as i64,
                record.duration_ms.map(|ms| ms as i64),
                record.summary,
                ts(record.started_at),
                record.completed_at.map(ts),
            ],
        )
        .map_err(|e| SkeinError::Store(format!("failed to insert run: {e}")))?;
        Ok(())
    }

    async fn update(&self, record: &RunRecord) -> SkeinResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE agent_runs SET status = ?2, items_processed = ?3, \
                 entities_found = ?4, errors_count = ?5, duration_ms = ?6, \
                 summary = ?7, completed_at = ?8 WHERE id = ?1",
                params![
                    record.id.to_string(),
                    record.status.as_str(),
                    record.items_processed as i64,
                    record.entities_found as i64,
                    record.errors_count as i64,
                    record.duration_ms.map(|ms| ms as i64),
                    record.summary,
                    record.completed_at.map(ts),
                ],
            )
            .map_err(|e| SkeinError::Store(format!("failed to update run: {e}")))?;
        if changed == 0 {
            return Err(SkeinError::Store(format!("run '{}' not found", record.id)));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> SkeinResult<Option<RunRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM agent_runs WHERE id = ?1"),
            params![id.to_string()],
            row_to_record,
        )
        .optional()
        .map_err(|e| SkeinError::Store(format!("failed to fetch run: {e}")))
    }

    async fn recent(&self, limit: usize) -> SkeinResult<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM agent_runs ORDER BY started_at DESC LIMIT ?1"
            ))
            .map_err(|e| SkeinError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_record)
            .map_err(|e| SkeinError::Store(format!("failed to list runs: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SkeinError::Store(format!("failed to read run row: {e}")))
    }

    async fn running(&self) -> SkeinResult<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM agent_runs WHERE status = 'running' \
                 ORDER BY started_at DESC"
            ))
            .map_err(|e| SkeinError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(|e| SkeinError::Store(format!("failed to list running runs: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SkeinError::Store(format!("failed to read run row: {e}")))
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, summary: &str) -> SkeinResult<usize> {
        let conn = self.conn.lock();
        let closed = conn
            .execute(
                "UPDATE agent_runs SET status = 'failed', completed_at = ?1, summary = ?2, \
                 errors_count = MAX(errors_count, 1) \
                 WHERE status = 'running' AND started_at < ?3",
                params![ts(Utc::now()), summary, ts(cutoff)],
            )
            .map_err(|e| SkeinError::Store(format!("failed to close stale runs: {e}")))?;
        if closed > 0 {
            warn!(closed, cutoff = %ts(cutoff), "Closed stale runs");
        }
        Ok(closed)
    }
}

/// Durable lock store backed by the same sqlite semantics as `SET NX EX`:
/// one transaction evicts an expired holder and inserts-if-absent.
///
/// Cross-process exclusion holds for every process pointing at the same
/// database file; WAL mode plus a busy timeout keeps writers from erroring
/// under contention.
pub struct SqliteLockStore {
    conn: Arc<Mutex<Connection>>,
    holder: String,
}

impl SqliteLockStore {
    pub fn open(path: impl AsRef<Path>) -> SkeinResult<Self> {
        let conn = open_connection(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> SkeinResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SkeinError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> SkeinResult<Self> {
        conn.execute_batch(LOCKS_SCHEMA)
            .map_err(|e| SkeinError::Store(format!("failed to create lock schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            holder: Uuid::new_v4().to_string(),
        })
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> SkeinResult<bool> {
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| SkeinError::Lock(format!("ttl out of range: {e}")))?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| SkeinError::Lock(format!("failed to begin transaction: {e}")))?;
        tx.execute(
            "DELETE FROM pipeline_locks WHERE key = ?1 AND expires_at <= ?2",
            params![key, ts(now)],
        )
        .map_err(|e| SkeinError::Lock(format!("failed to evict expired lock: {e}")))?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO pipeline_locks (key, holder, expires_at) \
                 VALUES (?1, ?2, ?3)",
                params![key, self.holder, ts(expires_at)],
            )
            .map_err(|e| SkeinError::Lock(format!("failed to acquire lock: {e}")))?;
        tx.commit()
            .map_err(|e| SkeinError::Lock(format!("failed to commit lock: {e}")))?;
        Ok(inserted == 1)
    }

    async fn release(&self, key: &str) -> SkeinResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM pipeline_locks WHERE key = ?1", params![key])
            .map_err(|e| SkeinError::Lock(format!("failed to release lock: {e}")))?;
        Ok(())
    }

    async fn is_held(&self, key: &str) -> SkeinResult<bool> {
        let conn = self.conn.lock();
        let held: Option<String> = conn
            .query_row(
                "SELECT key FROM pipeline_locks WHERE key = ?1 AND expires_at > ?2",
                params![key, ts(Utc::now())],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SkeinError::Lock(format!("failed to inspect lock: {e}")))?;
        Ok(held.is_some())
    }
}
