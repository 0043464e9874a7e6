//! In-process caches in front of the namespace store
//!
//! - [`NodeCache`]: name to node, bounded, no expiry
//! - [`QueryCache`]: pattern to matching names, TTL-bounded

mod node;
mod query;

pub use node::{NodeCache, NodeCacheStats, DEFAULT_NODE_CACHE_CAPACITY};
pub use query::{QueryCache, QueryCacheConfig, QueryCacheStats, DEFAULT_QUERY_TTL};
