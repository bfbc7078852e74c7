use async_trait::async_trait;
use parking_lot::Mutex;
use skein_core::SkeinResult;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cross-process mutual-exclusion seam.
///
/// Semantics mirror `SET key NX EX ttl` on a key-value store: acquisition
/// atomically sets the key only when absent (expired holders count as
/// absent), so at most one holder exists per key at any instant across all
/// users of the same backing store. The TTL bounds the staleness window if
/// a holder crashes without releasing.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Try to take the lock. Returns `Ok(false)` when another holder has it.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> SkeinResult<bool>;

    /// Drop the lock. Releasing an unheld key is a no-op.
    async fn release(&self, key: &str) -> SkeinResult<()>;

    /// Whether the key currently has an unexpired holder.
    async fn is_held(&self, key: &str) -> SkeinResult<bool>;
}

/// In-process lock store for tests and single-node deployments.
pub struct MemoryLockStore {
    held: Mutex<HashMap<String, Instant>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> SkeinResult<bool> {
        let mut held = self.held.lock();
        let now = Instant::now();
        if let Some(expires_at) = held.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        held.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn release(&self, key: &str) -> SkeinResult<()> {
        self.held.lock().remove(key);
        Ok(())
    }

    async fn is_held(&self, key: &str) -> SkeinResult<bool> {
        let held = self.held.lock();
        Ok(held.get(key).is_some_and(|expires_at| *expires_at > Instant::now()))
    }
}
