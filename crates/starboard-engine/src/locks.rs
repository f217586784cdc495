use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One mutex per message id. Entries are created on demand and dropped as
/// soon as nobody holds or waits on them, so the table only ever contains
/// ids with work in flight.
#[derive(Clone, Default)]
pub struct EntityLocks {
    table: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held while work on one message id is in progress. Dropping it releases
/// the lock, on every exit path.
pub struct EntityGuard {
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &str) -> EntityGuard {
        // Clone the Arc inside the shard lock, then wait outside it.
        let lock = self.table.entry(id.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;

        EntityGuard {
            id: id.to_string(),
            guard: Some(guard),
            table: self.table.clone(),
        }
    }

    /// Lock several ids in a fixed order so concurrent batches cannot deadlock.
    pub async fn acquire_many(&self, ids: &[String]) -> Vec<EntityGuard> {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.acquire(id).await);
        }
        guards
    }

    /// Number of ids currently locked or awaited.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl EntityGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody else is waiting.
        self.table
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
