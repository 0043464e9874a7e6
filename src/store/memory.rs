//! In-memory namespace store
//!
//! A lightweight alternative to Redis for tests and single-process use.
//! Keeps the same semantics as the networked backends: the parent index is
//! maintained on insert and delete, while `children` is only changed by
//! explicit `set_children`/`set_link` calls.
//!
//! # Warning
//!
//! All data is lost when the store is dropped.

use super::NamespaceStore;
use crate::error::StoreError;
use crate::types::MetricNode;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory [`NamespaceStore`]
pub struct MemoryNamespaceStore {
    /// name -> node record
    nodes: RwLock<HashMap<String, MetricNode>>,
    /// parent name -> names registered under it
    parent_index: RwLock<HashMap<String, BTreeSet<String>>>,
    /// When set, every call fails with a connection error
    unavailable: AtomicBool,
    /// Number of read calls served
    reads: AtomicU64,
    /// Number of write calls served
    writes: AtomicU64,
}

impl MemoryNamespaceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            parent_index: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Simulate an outage: while `true`, all calls return [`StoreError::ConnectionError`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True if the store holds no records
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Count of read calls served so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Count of write calls served so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Write a full record directly, bypassing insert semantics
    ///
    /// Lets tests seed drifted children lists or links.
    pub fn put_raw(&self, node: MetricNode) {
        self.parent_index
            .write()
            .entry(node.parent_name.clone())
            .or_default()
            .insert(node.name.clone());
        self.nodes.write().insert(node.name.clone(), node);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::ConnectionError(
                "memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn record_read(&self) -> Result<(), StoreError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_write(&self) -> Result<(), StoreError> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for MemoryNamespaceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NamespaceStore for MemoryNamespaceStore {
    fn store_id(&self) -> &str {
        "memory-v1"
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<MetricNode>, StoreError> {
        self.record_read()?;
        Ok(self.nodes.read().get(name).cloned())
    }

    async fn get_by_parent(&self, parent: &str) -> Result<Vec<MetricNode>, StoreError> {
        self.record_read()?;
        let names: Vec<String> = self
            .parent_index
            .read()
            .get(parent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let nodes = self.nodes.read();
        Ok(names.iter().filter_map(|n| nodes.get(n).cloned()).collect())
    }

    async fn get_by_names(&self, names: &[String]) -> Result<Vec<MetricNode>, StoreError> {
        self.record_read()?;
        let nodes = self.nodes.read();
        Ok(names.iter().filter_map(|n| nodes.get(n).cloned()).collect())
    }

    async fn insert(&self, node: &MetricNode) -> Result<(), StoreError> {
        self.record_write()?;
        {
            let mut nodes = self.nodes.write();
            match nodes.get_mut(&node.name) {
                // Upsert of the key columns only: a racing insert keeps the
                // children and link already recorded
                Some(existing) => existing.parent_name = node.parent_name.clone(),
                None => {
                    nodes.insert(node.name.clone(), node.clone());
                },
            }
        }
        self.parent_index
            .write()
            .entry(node.parent_name.clone())
            .or_default()
            .insert(node.name.clone());
        Ok(())
    }

    async fn set_children(
        &self,
        name: &str,
        children: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        self.record_write()?;
        if let Some(node) = self.nodes.write().get_mut(name) {
            node.children = children.clone();
        }
        Ok(())
    }

    async fn set_link(
        &self,
        name: &str,
        target: &str,
        children: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        self.record_write()?;
        match self.nodes.write().get_mut(name) {
            Some(node) => {
                node.link_target = Some(target.to_string());
                node.children = children.clone();
                Ok(())
            },
            None => Err(StoreError::CommandFailed(format!(
                "set_link on missing record '{}'",
                name
            ))),
        }
    }

    async fn delete_many(&self, names: &[String]) -> Result<(), StoreError> {
        self.record_write()?;
        let mut nodes = self.nodes.write();
        let mut index = self.parent_index.write();
        for name in names {
            if let Some(node) = nodes.remove(name) {
                if let Some(siblings) = index.get_mut(&node.parent_name) {
                    siblings.remove(name);
                    if siblings.is_empty() {
                        index.remove(&node.parent_name);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryNamespaceStore::new();
        store.insert(&MetricNode::new("a.b.c")).await.unwrap();

        let node = store.get_by_name("a.b.c").await.unwrap().unwrap();
        assert_eq!(node.parent_name, "a.b");
        assert!(store.get_by_name("a.b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parent_index_tracks_inserts() {
        let store = MemoryNamespaceStore::new();
        store.insert(&MetricNode::new("a.b.c")).await.unwrap();
        store.insert(&MetricNode::new("a.b.d")).await.unwrap();
        store.insert(&MetricNode::new("a.x.y")).await.unwrap();

        let mut kids: Vec<String> = store
            .get_by_parent("a.b")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        kids.sort();
        assert_eq!(kids, names(&["a.b.c", "a.b.d"]));
    }

    #[tokio::test]
    async fn test_insert_does_not_clobber_children() {
        let store = MemoryNamespaceStore::new();
        store.put_raw(MetricNode::new("a.b").with_children(["a.b.c"]));

        store.insert(&MetricNode::new("a.b")).await.unwrap();

        let node = store.get_by_name("a.b").await.unwrap().unwrap();
        assert!(node.children.contains("a.b.c"));
    }

    #[tokio::test]
    async fn test_batch_get_skips_missing() {
        let store = MemoryNamespaceStore::new();
        store.insert(&MetricNode::new("a")).await.unwrap();

        let found = store.get_by_names(&names(&["a", "b"])).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
    }

    #[tokio::test]
    async fn test_set_children_and_link() {
        let store = MemoryNamespaceStore::new();
        store.insert(&MetricNode::new("a.b")).await.unwrap();

        let kids: BTreeSet<String> = ["a.b.c".to_string()].into_iter().collect();
        store.set_children("a.b", &kids).await.unwrap();
        assert_eq!(store.get_by_name("a.b").await.unwrap().unwrap().children, kids);

        store.insert(&MetricNode::new("x.y")).await.unwrap();
        store.set_link("x.y", "a.b", &kids).await.unwrap();
        let link = store.get_by_name("x.y").await.unwrap().unwrap();
        assert_eq!(link.link_target.as_deref(), Some("a.b"));
        assert_eq!(link.children, kids);

        assert!(store.set_link("missing", "a.b", &kids).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_leaves_parent_children_alone() {
        let store = MemoryNamespaceStore::new();
        store.put_raw(MetricNode::new("a.b").with_children(["a.b.c"]));
        store.insert(&MetricNode::new("a.b.c")).await.unwrap();

        store.delete_many(&names(&["a.b.c"])).await.unwrap();

        assert!(store.get_by_name("a.b.c").await.unwrap().is_none());
        assert!(store.get_by_parent("a.b").await.unwrap().is_empty());
        // Stale reference stays until a repair runs
        let parent = store.get_by_name("a.b").await.unwrap().unwrap();
        assert!(parent.children.contains("a.b.c"));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryNamespaceStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_by_name("a").await,
            Err(StoreError::ConnectionError(_))
        ));
        assert!(store.insert(&MetricNode::new("a")).await.is_err());

        store.set_unavailable(false);
        assert!(store.get_by_name("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counters() {
        let store = MemoryNamespaceStore::new();
        store.insert(&MetricNode::new("a")).await.unwrap();
        store.get_by_name("a").await.unwrap();
        store.get_by_parent("root").await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.read_count(), 2);
        assert_eq!(store.len(), 1);
    }
}
