//! Retrieval cache - bounded FIFO cache over knowledge-base lookups
//!
//! Provides:
//! - Exact-key caching of score-filtered retrieval results
//! - Insertion-order eviction once the entry cap is reached
//! - Scope-level invalidation when an agent's documents change

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::metrics::{record_cache, record_cache_eviction, record_cache_invalidation};
use crate::pipeline::RetrievedChunk;

/// Label used for cache metrics.
const CACHE_NAME: &str = "retrieval";

/// Configuration for the retrieval cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCacheConfig {
    /// Maximum number of cached entries before the oldest is evicted
    pub capacity: usize,
    /// Minimum similarity a fetched chunk must reach to be kept
    pub similarity_threshold: f32,
}

impl Default for RetrievalCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            similarity_threshold: 0.3,
        }
    }
}

struct CacheInner {
    entries: HashMap<String, Vec<RetrievedChunk>>,
    /// Keys in insertion order; front is the eviction candidate
    order: VecDeque<String>,
}

/// Caches filtered retrieval results keyed by scope, query, and depth.
///
/// Lookups for the same normalized query are served from memory until
/// the entry is evicted or its scope is invalidated. Fetch futures run
/// outside the lock, so a slow vector index never blocks cache reads.
pub struct RetrievalCache {
    config: RetrievalCacheConfig,
    inner: Mutex<CacheInner>,
}

impl RetrievalCache {
    pub fn new(config: RetrievalCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Builds the cache key for a lookup.
    ///
    /// The query is lowercased and trimmed so trivially restated
    /// queries share an entry. Scope defaults to "global" when the
    /// lookup is not agent-bound.
    pub fn cache_key(scope: Option<&str>, query: &str, depth: usize) -> String {
        format!(
            "{}:{}:{}",
            scope.unwrap_or("global"),
            query.to_lowercase().trim(),
            depth
        )
    }

    /// Returns the cached results for this lookup, or runs `fetch`,
    /// filters the results by the similarity threshold, and caches
    /// them.
    ///
    /// Fetch errors propagate to the caller and leave the cache
    /// untouched, so the next identical lookup retries.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        scope: Option<&str>,
        query: &str,
        depth: usize,
        fetch: F,
    ) -> Result<Vec<RetrievedChunk>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<RetrievedChunk>>>,
    {
        let key = Self::cache_key(scope, query, depth);

        {
            let inner = self.lock();
            if let Some(cached) = inner.entries.get(&key) {
                record_cache(true, CACHE_NAME);
                return Ok(cached.clone());
            }
        }
        record_cache(false, CACHE_NAME);

        let fetched = fetch().await?;
        let threshold = self.config.similarity_threshold;
        let filtered: Vec<RetrievedChunk> = fetched
            .into_iter()
            .filter(|chunk| chunk.similarity_score >= threshold)
            .collect();

        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get_mut(&key) {
            // A concurrent fetch for the same key landed first. Keep
            // the newer result without adding a second order slot.
            *existing = filtered.clone();
            return Ok(filtered);
        }

        while inner.entries.len() >= self.config.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    record_cache_eviction(CACHE_NAME);
                }
                None => break,
            }
        }
        inner.entries.insert(key.clone(), filtered.clone());
        inner.order.push_back(key);

        Ok(filtered)
    }

    /// Drops every entry belonging to the given scope and returns the
    /// number removed. Called when the scope's documents change.
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        let prefix = format!("{}:", scope);
        let mut inner = self.lock();

        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(&prefix));
        inner.order.retain(|key| !key.starts_with(&prefix));
        let dropped = before - inner.entries.len();

        if dropped > 0 {
            record_cache_invalidation(CACHE_NAME, dropped);
        }
        dropped
    }

    /// Empties the cache and returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();

        if dropped > 0 {
            record_cache_invalidation(CACHE_NAME, dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Recovers the guard even if a previous holder panicked; the map
    /// and order queue stay internally consistent across panics
    /// because both are updated under the same lock section.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(RetrievalCacheConfig::default())
    }
}
