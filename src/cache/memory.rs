//! In-process LRU cache tier
//!
//! Fallback tier used when no shared cache is configured or the shared
//! tier is unreachable. TTL is per entry, in milliseconds.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::types::Artifact;

/// Default capacity of the in-process tier
pub const LRU_CAPACITY: usize = 1000;

struct Entry {
    artifact: Artifact,
    stored_at: Instant,
}

/// LRU cache with TTL-expired entries evicted on read
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_millis(ttl_ms),
        }
    }

    pub fn get(&self, key: &str) -> Option<Artifact> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.artifact.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, artifact: &Artifact) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.put(
            key.to_string(),
            Entry {
                artifact: artifact.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
