//! Keyed async locks
//!
//! One mutex per artifact key. A second caller for the same key waits for the
//! first to finish instead of racing it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type Slot = Arc<Mutex<()>>;

#[derive(Default)]
pub struct KeyedLocks {
    entries: Mutex<HashMap<String, Slot>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut entries = self.entries.lock().await;
            // drop slots nobody holds or waits on
            entries.retain(|_, slot| Arc::strong_count(slot) > 1);
            entries.entry(key.to_string()).or_default().clone()
        };
        debug!(%key, "KeyedLocks::acquire: waiting");
        slot.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
