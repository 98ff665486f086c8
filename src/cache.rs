use dashmap::DashMap;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

/// Thread-safe in-memory cache with a fixed time-to-live per instance.
///
/// Expiry is lazy: an entry older than the TTL is dropped the next time it is
/// read, and nothing sweeps the map in the background. Both the handler layer
/// and the link store keep one of these, with different TTLs.
#[derive(Clone, Debug)]
pub struct TtlCache<V> {
    inner: Arc<DashMap<String, Entry<V>>>,
    ttl: Duration,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Snapshot reported by `/stats` and `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub ttl_seconds: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Insert or replace a value, restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.inner.insert(
            key.into(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Return a clone of the value if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entry = self.inner.get(key)?;
            if entry.inserted_at.elapsed() <= self.ttl {
                return Some(entry.value.clone());
            }
        }

        // Read guard is gone; a concurrent `set` may have refreshed the key.
        let ttl = self.ttl;
        self.inner
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() > ttl);
        None
    }

    /// Modify a live entry in place and restart its TTL. Missing or expired
    /// keys are left alone; returns whether an entry was updated.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut V)) -> bool {
        match self.inner.get_mut(key) {
            Some(mut entry) if entry.inserted_at.elapsed() <= self.ttl => {
                f(&mut entry.value);
                entry.inserted_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    pub fn delete(&self, key: &str) {
        self.inner.remove(key);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}
