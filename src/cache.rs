//! Bounded, categorized response cache shared across requests.
//!
//! # Responsibilities
//! - Hold four independent categories (static, api, html, image)
//! - Enforce `size <= capacity` after every write, evicting oldest first
//! - Never serve an entry older than its category TTL (lazy check on read)
//! - Sweep expired entries on a timer to bound memory under low traffic
//!
//! # Design Decisions
//! - One `Mutex<HashMap>` per category; single writer at a time is enough
//! - Eviction tie-break on equal timestamps is insertion order, tracked by a
//!   per-category sequence counter
//! - Entries are cloned out on read; bodies are `Bytes` so clones are cheap

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

use crate::config::{CacheCategoryConfig, CacheConfig};
use crate::observability::metrics;

/// Cache category. Each holds its own TTL, capacity and entry map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Static,
    Api,
    Html,
    Image,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Static,
        CacheCategory::Api,
        CacheCategory::Html,
        CacheCategory::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Static => "static",
            CacheCategory::Api => "api",
            CacheCategory::Html => "html",
            CacheCategory::Image => "image",
        }
    }
}

/// One cached upstream response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

struct Slot {
    entry: CacheEntry,
    stored_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct Shard {
    map: HashMap<String, Slot>,
    next_seq: u64,
}

impl Shard {
    fn insert(&mut self, key: String, entry: CacheEntry, capacity: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.map.insert(
            key,
            Slot {
                entry,
                stored_at: Instant::now(),
                seq,
            },
        );

        // Oldest timestamp first; insertion order breaks ties.
        while self.map.len() > capacity {
            let victim = self
                .map
                .iter()
                .min_by_key(|(_, slot)| (slot.stored_at, slot.seq))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    self.map.remove(&key);
                }
                None => break,
            }
        }
    }

    fn get_fresh(&self, key: &str, max_age: Duration) -> Option<CacheEntry> {
        let slot = self.map.get(key)?;
        if slot.stored_at.elapsed() > max_age {
            return None;
        }
        Some(slot.entry.clone())
    }

    fn sweep(&mut self, ttl: Duration) -> usize {
        let before = self.map.len();
        self.map.retain(|_, slot| slot.stored_at.elapsed() <= ttl);
        before - self.map.len()
    }
}

/// The shared response cache. Injected into handlers, never a global.
pub struct ResponseCache {
    shards: [Mutex<Shard>; 4],
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shards: [
                Mutex::new(Shard::default()),
                Mutex::new(Shard::default()),
                Mutex::new(Shard::default()),
                Mutex::new(Shard::default()),
            ],
            config,
        }
    }

    fn shard(&self, category: CacheCategory) -> &Mutex<Shard> {
        match category {
            CacheCategory::Static => &self.shards[0],
            CacheCategory::Api => &self.shards[1],
            CacheCategory::Html => &self.shards[2],
            CacheCategory::Image => &self.shards[3],
        }
    }

    fn category_config(&self, category: CacheCategory) -> CacheCategoryConfig {
        match category {
            CacheCategory::Static => self.config.static_assets,
            CacheCategory::Api => self.config.api,
            CacheCategory::Html => self.config.html,
            CacheCategory::Image => self.config.image,
        }
    }

    /// Category TTL as a `Duration`.
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        Duration::from_millis(self.category_config(category).ttl_ms)
    }

    /// Look up a fresh entry under the category TTL.
    pub fn get(&self, category: CacheCategory, key: &str) -> Option<CacheEntry> {
        self.get_with_max_age(category, key, self.ttl(category))
    }

    /// Look up with a caller-supplied freshness window (device tiers shrink
    /// it). The window is clamped to the category TTL so the TTL invariant
    /// holds regardless of the caller.
    pub fn get_with_max_age(
        &self,
        category: CacheCategory,
        key: &str,
        max_age: Duration,
    ) -> Option<CacheEntry> {
        let max_age = max_age.min(self.ttl(category));
        let shard = self.shard(category).lock().expect("cache mutex poisoned");
        shard.get_fresh(key, max_age)
    }

    /// Insert an entry, then evict oldest entries past capacity.
    pub fn put(&self, category: CacheCategory, key: impl Into<String>, entry: CacheEntry) {
        let capacity = self.category_config(category).capacity;
        let mut shard = self.shard(category).lock().expect("cache mutex poisoned");
        shard.insert(key.into(), entry, capacity);
    }

    /// Current entry count of one category.
    pub fn len(&self, category: CacheCategory) -> usize {
        self.shard(category)
            .lock()
            .expect("cache mutex poisoned")
            .map
            .len()
    }

    pub fn is_empty(&self, category: CacheCategory) -> bool {
        self.len(category) == 0
    }

    /// Remove expired entries in every category.
    pub fn sweep(&self) {
        for category in CacheCategory::ALL {
            let ttl = self.ttl(category);
            let removed = self
                .shard(category)
                .lock()
                .expect("cache mutex poisoned")
                .sweep(ttl);
            if removed > 0 {
                tracing::debug!(
                    category = category.as_str(),
                    removed,
                    "cache sweep removed expired entries"
                );
                metrics::record_cache_sweep(category.as_str(), removed);
            }
        }
    }

    /// Spawn the periodic expiry sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        });
    }
}

/// Cache key for API relays: `api-<METHOD>-<path>`. Static assets key on the
/// bare path.
pub fn api_key(method: &axum::http::Method, path: &str) -> String {
    format!("api-{method}-{path}")
}
