//! Namespace store contract
//!
//! The namespace index keeps no durable state of its own. Every node lives
//! in an external store addressed by metric name, with a secondary index on
//! the parent name. The store is the single source of truth: the node cache
//! and the repairer both defer to it.
//!
//! No transactions are assumed. Each call is an independent read or write,
//! and the `children` column is *not* kept consistent with the parent index
//! by the store itself.
//!
//! # Implementations
//!
//! - [`MemoryNamespaceStore`]: in-process, for tests and single-node embedding
//! - [`crate::redis::RedisNamespaceStore`]: Redis-backed

mod memory;

pub use memory::MemoryNamespaceStore;

use crate::error::StoreError;
use crate::types::MetricNode;

use async_trait::async_trait;
use std::collections::BTreeSet;

/// Key-lookup / parent-scan contract over the backing store
#[async_trait]
pub trait NamespaceStore: Send + Sync + 'static {
    /// Identifier for logs and stats
    fn store_id(&self) -> &str;

    /// Point lookup by name
    async fn get_by_name(&self, name: &str) -> Result<Option<MetricNode>, StoreError>;

    /// All nodes whose `parent_name` equals `parent`, via the parent index
    async fn get_by_parent(&self, parent: &str) -> Result<Vec<MetricNode>, StoreError>;

    /// Batch lookup; only names actually present are returned
    async fn get_by_names(&self, names: &[String]) -> Result<Vec<MetricNode>, StoreError>;

    /// Write a node record and register it in the parent index
    async fn insert(&self, node: &MetricNode) -> Result<(), StoreError>;

    /// Overwrite the recorded children of `name`
    async fn set_children(&self, name: &str, children: &BTreeSet<String>)
        -> Result<(), StoreError>;

    /// Mark `name` as a link to `target` and store a snapshot of its children
    async fn set_link(
        &self,
        name: &str,
        target: &str,
        children: &BTreeSet<String>,
    ) -> Result<(), StoreError>;

    /// Remove the listed records outright; children lists referencing them are left alone
    async fn delete_many(&self, names: &[String]) -> Result<(), StoreError>;
}
