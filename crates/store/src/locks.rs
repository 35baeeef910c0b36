//! Per-key async locks
//!
//! Writers (`put`, `delete`) take the exclusive side, readers that move bytes
//! take the shared side. Tokio's `RwLock` is fair, so operations on one key
//! are granted in submission order.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockMap = DashMap<String, Arc<RwLock<()>>>;

#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Arc<LockMap>,
}

enum Held {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Guard that drops its map slot once nobody else holds or waits on the key
pub(crate) struct KeyGuard {
    held: Option<Held>,
    key: String,
    locks: Arc<LockMap>,
}

impl KeyLocks {
    fn slot(&self, key: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub(crate) async fn read(&self, key: &str) -> KeyGuard {
        let guard = self.slot(key).read_owned().await;
        KeyGuard {
            held: Some(Held::Read(guard)),
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    pub(crate) async fn write(&self, key: &str) -> KeyGuard {
        let guard = self.slot(key).write_owned().await;
        KeyGuard {
            held: Some(Held::Write(guard)),
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the strong count reflects only the map and waiters
        self.held.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
