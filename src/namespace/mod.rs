//! Metric namespace index
//!
//! [`MetricNamespace`] ties together the backing store, the node cache and
//! the query cache. The operations are split by concern:
//!
//! - `alias`: link-aware path resolution
//! - `glob`: shell-style segment patterns
//! - `query`: recursive wildcard expansion
//! - `repair`: parent/children consistency
//! - `create`: lazy ancestor creation, links and deletion
//!
//! # Error surface
//!
//! Query paths (`get_node`, `resolve_matches`, `resolve_nodes`, ...) never
//! fail: store errors are logged, counted and treated as "not found".
//! Mutation paths (`ensure_node`, `create_link`, `delete_many`,
//! `repair_children`) return [`crate::error::NamespaceError`].
//!
//! # Example
//!
//! ```rust
//! use kuba_namespace::namespace::{MetricNamespace, NamespaceConfig};
//! use kuba_namespace::store::MemoryNamespaceStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), kuba_namespace::error::NamespaceError> {
//! let ns = MetricNamespace::new(Arc::new(MemoryNamespaceStore::new()), NamespaceConfig::default());
//! ns.ensure_node("servers.web01.cpu").await?;
//!
//! let matches = ns.resolve_matches("servers.*.cpu").await;
//! assert_eq!(matches, vec!["servers.web01.cpu".to_string()]);
//! # Ok(())
//! # }
//! ```

mod alias;
mod create;
pub mod glob;
mod query;
mod repair;

pub use alias::ResolvedPath;
pub use repair::RepairOutcome;

use crate::cache::{
    NodeCache, QueryCache, QueryCacheConfig, DEFAULT_NODE_CACHE_CAPACITY, DEFAULT_QUERY_TTL,
};
use crate::error::StoreError;
use crate::metrics;
use crate::naming::DEFAULT_MIN_SEGMENTS;
use crate::store::NamespaceStore;
use crate::types::{MetricNode, ROOT_PARENT};

use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Tunables for a [`MetricNamespace`]
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    /// Minimum number of segments in a newly created leaf name
    pub min_segments: usize,

    /// When set, alias resolution is skipped for paths not containing this
    /// fragment
    pub linkable_fragment: Option<String>,

    /// Node cache capacity
    pub node_cache_capacity: usize,

    /// Query cache entry lifetime
    pub query_cache_ttl: Duration,

    /// Maximum cached query patterns
    pub query_cache_max_entries: usize,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            min_segments: DEFAULT_MIN_SEGMENTS,
            linkable_fragment: None,
            node_cache_capacity: DEFAULT_NODE_CACHE_CAPACITY,
            query_cache_ttl: DEFAULT_QUERY_TTL,
            query_cache_max_entries: QueryCacheConfig::default().max_entries,
        }
    }
}

/// Point-in-time counters, served by the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStats {
    /// Backing store identifier
    pub store: String,
    /// Entries in the node cache
    pub node_cache_entries: usize,
    /// Node cache hits
    pub node_cache_hits: u64,
    /// Node cache misses
    pub node_cache_misses: u64,
    /// Node cache capacity evictions
    pub node_cache_evictions: u64,
    /// Entries in the query cache
    pub query_cache_entries: usize,
    /// Query cache hits
    pub query_cache_hits: u64,
    /// Query cache misses
    pub query_cache_misses: u64,
}

/// The namespace index
pub struct MetricNamespace {
    store: Arc<dyn NamespaceStore>,
    nodes: NodeCache,
    queries: QueryCache,
    config: NamespaceConfig,
}

impl MetricNamespace {
    /// Build a namespace with caches sized from `config`
    pub fn new(store: Arc<dyn NamespaceStore>, config: NamespaceConfig) -> Self {
        let nodes = NodeCache::new(config.node_cache_capacity);
        let queries = QueryCache::new(
            QueryCacheConfig::default()
                .with_ttl(config.query_cache_ttl)
                .with_max_entries(config.query_cache_max_entries),
        );
        Self::with_caches(store, nodes, queries, config)
    }

    /// Build a namespace around caches constructed by the caller
    pub fn with_caches(
        store: Arc<dyn NamespaceStore>,
        nodes: NodeCache,
        queries: QueryCache,
        config: NamespaceConfig,
    ) -> Self {
        Self {
            store,
            nodes,
            queries,
            config,
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn NamespaceStore> {
        &self.store
    }

    /// Node cache
    pub fn node_cache(&self) -> &NodeCache {
        &self.nodes
    }

    /// Query cache
    pub fn query_cache(&self) -> &QueryCache {
        &self.queries
    }

    /// Active configuration
    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Look up a node, cache first
    ///
    /// Store failures are logged and reported as absent.
    pub async fn get_node(&self, name: &str) -> Option<MetricNode> {
        match self.fetch_node(name).await {
            Ok(node) => node,
            Err(e) => {
                warn!(name = %name, error = %e, "Node lookup failed, treating as absent");
                None
            },
        }
    }

    /// Look up several nodes, cache first, one store round-trip for the misses
    ///
    /// Only nodes that exist are returned. On store failure the cached
    /// subset is returned.
    pub async fn get_nodes(&self, names: &[String]) -> Vec<MetricNode> {
        let (mut found, missing) = self.nodes.get_many(names);
        metrics::record_node_cache(true, found.len());
        if missing.is_empty() {
            return found;
        }
        metrics::record_node_cache(false, missing.len());

        match self.store.get_by_names(&missing).await {
            Ok(fetched) => {
                for node in fetched {
                    self.nodes.put(node.clone());
                    found.push(node);
                }
            },
            Err(e) => {
                metrics::record_store_error("get_by_names");
                warn!(count = missing.len(), error = %e, "Batch node lookup failed");
            },
        }
        found
    }

    /// Top-level nodes, each cached on read
    pub async fn root_nodes(&self) -> Vec<MetricNode> {
        match self.store.get_by_parent(ROOT_PARENT).await {
            Ok(nodes) => {
                for node in &nodes {
                    self.nodes.put(node.clone());
                }
                nodes
            },
            Err(e) => {
                metrics::record_store_error("get_by_parent");
                warn!(error = %e, "Root node listing failed");
                Vec::new()
            },
        }
    }

    /// Snapshot of cache counters
    pub fn stats(&self) -> NamespaceStats {
        let node_stats = self.nodes.stats();
        let query_stats = self.queries.stats();
        NamespaceStats {
            store: self.store.store_id().to_string(),
            node_cache_entries: self.nodes.len(),
            node_cache_hits: node_stats.hits.load(Ordering::Relaxed),
            node_cache_misses: node_stats.misses.load(Ordering::Relaxed),
            node_cache_evictions: node_stats.evictions.load(Ordering::Relaxed),
            query_cache_entries: self.queries.len(),
            query_cache_hits: query_stats.hits.load(Ordering::Relaxed),
            query_cache_misses: query_stats.misses.load(Ordering::Relaxed),
        }
    }

    /// Read-through lookup that surfaces store errors
    pub(crate) async fn fetch_node(&self, name: &str) -> Result<Option<MetricNode>, StoreError> {
        if let Some(node) = self.nodes.get(name) {
            metrics::record_node_cache(true, 1);
            return Ok(Some(node));
        }
        metrics::record_node_cache(false, 1);

        let node = self.store.get_by_name(name).await.map_err(|e| {
            metrics::record_store_error("get_by_name");
            e
        })?;
        if let Some(node) = &node {
            self.nodes.put(node.clone());
        }
        Ok(node)
    }
}
