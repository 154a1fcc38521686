use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// `(account, host)`
pub type LockKey = (String, String);

/// Serializes lifecycle operations per account and host.
///
/// Entries are dropped once nobody holds or waits for them.
#[derive(Default)]
pub struct KeyedLocks {
    entries: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

pub struct KeyedGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
    entries: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, account: &str, host: &str) -> KeyedGuard {
        let key = (account.to_string(), host.to_string());
        let mutex = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        if mutex.try_lock().is_err() {
            tracing::debug!(account, host, "waiting for in-flight operation");
        }
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key,
            guard: Some(guard),
            entries: Arc::clone(&self.entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only other reference.
        drop(self.guard.take());
        self.entries
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
