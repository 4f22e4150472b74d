//! Per-session mutual exclusion.
//!
//! One async mutex per game id, created on first use and dropped when no turn
//! holds or waits for it. Unrelated games never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 128;

/// Keyed registry of per-session locks.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        // The map holds no invariant a panicking holder could break.
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());

        // Opportunistically prune dead weak refs when the map grows.
        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Waits for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Returns `None` when another turn holds `key`.
    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(key).try_lock_owned().ok()
    }

    /// Number of keys with a live lock.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
