//! Per-secret mutual exclusion for stores whose label moves are not atomic

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of secret id to lock
///
/// Entries nobody holds or waits on are pruned on the next acquire.
#[derive(Debug, Clone, Default)]
pub struct SecretLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SecretLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `secret_id`
    ///
    /// Access is held until the returned guard is dropped.
    pub async fn acquire(&self, secret_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(secret_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn entry_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
