use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// String-keyed cache whose entries expire a fixed time after their last write.
/// Expired entries are invisible to readers immediately and reclaimed by
/// `sweep`.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop expired entries. Returns how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Background task that reclaims expired entries on an interval.
pub async fn run_sweep_loop<V>(name: &'static str, cache: Arc<TtlCache<V>>, every: Duration)
where
    V: Clone + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(every);
    // The first tick fires immediately; skip it.
    interval.tick().await;

    loop {
        interval.tick().await;

        let reclaimed = cache.sweep();
        if reclaimed > 0 {
            debug!(cache = name, reclaimed, "Cache sweep");
        }
    }
}
