//! Node cache
//!
//! Bounded in-memory map from metric name to the last [`MetricNode`] read
//! from or written to the store. Entries never expire on their own; they are
//! dropped only by [`NodeCache::invalidate`] or by capacity eviction.
//!
//! Eviction removes an arbitrary entry. Hot entries may be evicted, and a
//! re-read from the store restores them.
//!
//! # Example
//!
//! ```rust
//! use kuba_namespace::cache::NodeCache;
//! use kuba_namespace::types::MetricNode;
//!
//! let cache = NodeCache::new(1000);
//! cache.put(MetricNode::new("servers.web01.cpu"));
//!
//! assert!(cache.get("servers.web01.cpu").is_some());
//! cache.invalidate("servers.web01.cpu");
//! assert!(cache.get("servers.web01.cpu").is_none());
//! ```

use crate::types::MetricNode;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default capacity of the node cache
pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 10_000_000;

/// Node cache statistics
#[derive(Debug, Default)]
pub struct NodeCacheStats {
    /// Lookups answered from the cache
    pub hits: AtomicU64,
    /// Lookups that found nothing
    pub misses: AtomicU64,
    /// Entries removed to make room
    pub evictions: AtomicU64,
    /// Entries removed by invalidation
    pub invalidations: AtomicU64,
}

/// Bounded map from name to node
///
/// Every operation takes the lock for a single map access and releases it
/// before returning, so callers never hold it across a store round-trip.
pub struct NodeCache {
    entries: Mutex<HashMap<String, MetricNode>>,
    capacity: usize,
    stats: NodeCacheStats,
}

impl NodeCache {
    /// Create a cache holding at most `capacity` entries
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            stats: NodeCacheStats::default(),
        }
    }

    /// Look up a single node
    pub fn get(&self, name: &str) -> Option<MetricNode> {
        let found = self.entries.lock().get(name).cloned();
        self.record(found.is_some());
        found
    }

    /// Look up several nodes at once
    ///
    /// Returns the nodes found and the names that missed, in input order.
    pub fn get_many(&self, names: &[String]) -> (Vec<MetricNode>, Vec<String>) {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        {
            let entries = self.entries.lock();
            for name in names {
                match entries.get(name) {
                    Some(node) => found.push(node.clone()),
                    None => missing.push(name.clone()),
                }
            }
        }
        self.stats
            .hits
            .fetch_add(found.len() as u64, Ordering::Relaxed);
        self.stats
            .misses
            .fetch_add(missing.len() as u64, Ordering::Relaxed);
        (found, missing)
    }

    /// Insert or replace a node, evicting one arbitrary entry when full
    pub fn put(&self, node: MetricNode) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&node.name) {
            let victim = entries.keys().next().cloned();
            if let Some(victim) = victim {
                entries.remove(&victim);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.insert(node.name.clone(), node);
    }

    /// Drop the entry for `name`; the next lookup falls through to the store
    pub fn invalidate(&self, name: &str) {
        if self.entries.lock().remove(name).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cache statistics
    pub fn stats(&self) -> &NodeCacheStats {
        &self.stats
    }

    /// Fraction of lookups served from the cache (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_CACHE_CAPACITY)
    }
}
