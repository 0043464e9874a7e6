//! Query result cache
//!
//! Maps a query pattern to the list of matching metric names it resolved to.
//! Entries expire after a fixed TTL; there is no event-driven invalidation,
//! so a node created or deleted after an entry was written stays invisible
//! (or visible) for up to one TTL.
//!
//! Empty results are never stored. A pattern that matched nothing is
//! re-resolved on the next call.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// Cache Configuration
// ============================================================================

/// Default lifetime of a cached query result
pub const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(3600);

/// Configuration for query result caching
#[derive(Debug, Clone)]
pub struct QueryCacheConfig {
    /// Lifetime of an entry (default: 1 hour)
    pub ttl: Duration,

    /// Maximum number of cached patterns (default: 100,000)
    pub max_entries: usize,

    /// Enable cache (default: true)
    pub enabled: bool,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_QUERY_TTL,
            max_entries: 100_000,
            enabled: true,
        }
    }
}

impl QueryCacheConfig {
    /// Set entry lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set maximum entries
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Disable caching
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

struct CacheEntry {
    matches: Vec<String>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// Query Cache
// ============================================================================

/// Query cache statistics
#[derive(Debug, Default)]
pub struct QueryCacheStats {
    /// Lookups answered from the cache
    pub hits: AtomicU64,
    /// Lookups that found nothing or an expired entry
    pub misses: AtomicU64,
    /// Expired entries removed on lookup or purge
    pub expirations: AtomicU64,
    /// Entries removed to stay under `max_entries`
    pub evictions: AtomicU64,
}

/// TTL cache from pattern to matching names
pub struct QueryCache {
    config: QueryCacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: QueryCacheStats,
}

impl QueryCache {
    /// Create a new query cache
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            stats: QueryCacheStats::default(),
        }
    }

    /// Create a cache with the given TTL and default limits
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(QueryCacheConfig::default().with_ttl(ttl))
    }

    /// Return the cached matches for `pattern` if present and fresh
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, pattern: &str) -> Option<Vec<String>> {
        if !self.config.enabled {
            return None;
        }

        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(pattern) {
                Some(entry) if !entry.is_expired(now) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.matches.clone());
                },
                Some(_) => {},
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                },
            }
        }

        // Expired: re-check under the write lock, a concurrent put may have refreshed it
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(pattern) {
            if entry.is_expired(now) {
                entries.remove(pattern);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.matches.clone());
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Cache `matches` for `pattern` with the configured TTL
    ///
    /// Empty lists are ignored.
    pub fn put(&self, pattern: &str, matches: Vec<String>) {
        if !self.config.enabled || matches.is_empty() {
            return;
        }

        let entry = CacheEntry {
            matches,
            expires_at: Instant::now() + self.config.ttl,
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.config.max_entries && !entries.contains_key(pattern) {
            self.evict_one(&mut entries);
        }
        entries.insert(pattern.to_string(), entry);
    }

    /// Drop a single pattern
    pub fn invalidate(&self, pattern: &str) {
        self.entries.write().remove(pattern);
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();
        self.stats
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Cache statistics
    pub fn stats(&self) -> &QueryCacheStats {
        &self.stats
    }

    /// Prefer an expired entry; otherwise the one closest to expiry
    fn evict_one(&self, entries: &mut HashMap<String, CacheEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryCacheConfig::default())
    }
}
