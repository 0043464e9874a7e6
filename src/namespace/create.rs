//! Node creation, links and deletion

use super::MetricNamespace;
use crate::error::NamespaceError;
use crate::metrics;
use crate::naming::validate_metric_name;
use crate::types::{dot_prefixes, parent_name, MetricNode, ROOT_PARENT};

use tracing::{debug, info, warn};

impl MetricNamespace {
    /// Return the node for `name`, creating it and any missing ancestors
    ///
    /// Only `name` itself is validated; ancestors derived from a valid name
    /// are created as-is. Each new node is inserted with no children and its
    /// parent is repaired so the parent's children include it. Safe to call
    /// repeatedly and concurrently.
    pub async fn ensure_node(&self, name: &str) -> Result<MetricNode, NamespaceError> {
        if let Some(node) = self.fetch_node(name).await? {
            return Ok(node);
        }

        validate_metric_name(name, self.config.min_segments)?;

        // Walk up until an existing ancestor is found
        let mut missing = Vec::new();
        for ancestor in dot_prefixes(name).into_iter().skip(1) {
            if self.fetch_node(&ancestor).await?.is_some() {
                break;
            }
            missing.push(ancestor);
        }

        for ancestor in missing.iter().rev() {
            self.create_node(ancestor, "ancestor").await?;
        }
        let node = self.create_node(name, "leaf").await?;

        info!(name = %name, ancestors = missing.len(), "Created metric node");
        Ok(node)
    }

    async fn create_node(&self, name: &str, kind: &str) -> Result<MetricNode, NamespaceError> {
        let node = MetricNode::new(name);
        self.store.insert(&node).await.map_err(|e| {
            metrics::record_store_error("insert");
            e
        })?;
        self.nodes.put(node.clone());
        metrics::record_node_created(kind);

        self.refresh_parent(parent_name(name)).await;
        debug!(name = %name, kind = kind, "Inserted node");

        self.fetch_node(name)
            .await?
            .ok_or_else(|| NamespaceError::NodeVanished(name.to_string()))
    }

    /// Repair `parent` after a child was written
    ///
    /// A failure leaves the parent's children stale until its next repair;
    /// the child itself is already stored.
    async fn refresh_parent(&self, parent: &str) {
        if parent == ROOT_PARENT {
            return;
        }
        if let Err(e) = self.repair_children(parent).await {
            metrics::record_repair("failed");
            warn!(parent = %parent, error = %e, "Parent repair failed, children left stale");
        }
    }

    /// Make `link` an alias of the existing node `real`
    ///
    /// The link stores a snapshot of `real`'s children taken now. Calling this
    /// again refreshes the snapshot; if `link` already points at `real` with
    /// the same children it is returned untouched.
    pub async fn create_link(&self, real: &str, link: &str) -> Result<MetricNode, NamespaceError> {
        let real_node = self
            .fetch_node(real)
            .await?
            .ok_or_else(|| NamespaceError::LinkTargetMissing(real.to_string()))?;

        if let Some(existing) = self.fetch_node(link).await? {
            if existing.link_target.as_deref() == Some(real) && existing.children == real_node.children {
                return Ok(existing);
            }
        }

        self.ensure_node(link).await?;
        self.store
            .set_link(link, real, &real_node.children)
            .await
            .map_err(|e| {
                metrics::record_store_error("set_link");
                e
            })?;
        self.nodes.invalidate(link);
        let node = self
            .fetch_node(link)
            .await?
            .ok_or_else(|| NamespaceError::NodeVanished(link.to_string()))?;

        self.refresh_parent(parent_name(link)).await;

        metrics::record_node_created("link");
        info!(link = %link, target = %real, "Created link");
        Ok(node)
    }

    /// True if `link` exists and points at `real`
    pub async fn link_exists(&self, real: &str, link: &str) -> bool {
        self.get_node(link)
            .await
            .map(|n| n.link_target.as_deref() == Some(real))
            .unwrap_or(false)
    }

    /// Delete the listed nodes
    ///
    /// No cascade and no parent repair: parents keep listing deleted
    /// children until their next repair.
    pub async fn delete_many(&self, names: &[String]) -> Result<(), NamespaceError> {
        self.store.delete_many(names).await.map_err(|e| {
            metrics::record_store_error("delete_many");
            e
        })?;
        for name in names {
            self.nodes.invalidate(name);
        }
        info!(count = names.len(), "Deleted nodes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NamingError;
    use crate::namespace::NamespaceConfig;
    use crate::error::StoreError;
    use crate::store::{MemoryNamespaceStore, NamespaceStore};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// Memory store whose parent index scan always fails
    struct BrokenParentIndex(MemoryNamespaceStore);

    #[async_trait]
    impl NamespaceStore for BrokenParentIndex {
        fn store_id(&self) -> &str {
            "broken-parent-index"
        }

        async fn get_by_name(&self, name: &str) -> Result<Option<MetricNode>, StoreError> {
            self.0.get_by_name(name).await
        }

        async fn get_by_parent(&self, _parent: &str) -> Result<Vec<MetricNode>, StoreError> {
            Err(StoreError::ConnectionError("parent index unavailable".to_string()))
        }

        async fn get_by_names(&self, names: &[String]) -> Result<Vec<MetricNode>, StoreError> {
            self.0.get_by_names(names).await
        }

        async fn insert(&self, node: &MetricNode) -> Result<(), StoreError> {
            self.0.insert(node).await
        }

        async fn set_children(&self, name: &str, children: &BTreeSet<String>) -> Result<(), StoreError> {
            self.0.set_children(name, children).await
        }

        async fn set_link(
            &self,
            name: &str,
            target: &str,
            children: &BTreeSet<String>,
        ) -> Result<(), StoreError> {
            self.0.set_link(name, target, children).await
        }

        async fn delete_many(&self, names: &[String]) -> Result<(), StoreError> {
            self.0.delete_many(names).await
        }
    }

    fn namespace() -> (Arc<MemoryNamespaceStore>, MetricNamespace) {
        let store = Arc::new(MemoryNamespaceStore::new());
        let ns = MetricNamespace::new(store.clone(), NamespaceConfig::default());
        (store, ns)
    }

    #[tokio::test]
    async fn test_ensure_node_creates_ancestors() {
        let (store, ns) = namespace();
        let node = ns.ensure_node("a.b.c").await.unwrap();
        assert_eq!(node.name, "a.b.c");
        assert!(node.is_leaf());

        let a = store.get_by_name("a").await.unwrap().unwrap();
        assert_eq!(a.parent_name, ROOT_PARENT);
        assert!(a.children.contains("a.b"));

        let ab = store.get_by_name("a.b").await.unwrap().unwrap();
        assert!(ab.children.contains("a.b.c"));
    }

    #[tokio::test]
    async fn test_ensure_node_is_idempotent() {
        let (store, ns) = namespace();
        let first = ns.ensure_node("a.b.c").await.unwrap();
        let writes = store.write_count();

        let second = ns.ensure_node("a.b.c").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.write_count(), writes);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_ensure_node_shares_existing_ancestors() {
        let (store, ns) = namespace();
        ns.ensure_node("a.b.c").await.unwrap();
        ns.ensure_node("a.b.d").await.unwrap();
        ns.ensure_node("a.x.y").await.unwrap();

        assert_eq!(store.len(), 6);
        let ab = store.get_by_name("a.b").await.unwrap().unwrap();
        assert_eq!(ab.children.len(), 2);
        let a = store.get_by_name("a").await.unwrap().unwrap();
        assert_eq!(a.children.len(), 2);
    }

    #[tokio::test]
    async fn test_ensure_node_validates_leaf_only() {
        let (store, ns) = namespace();
        assert!(matches!(
            ns.ensure_node("a.b").await,
            Err(NamespaceError::InvalidName(NamingError::TooFewSegments { .. }))
        ));
        assert!(matches!(
            ns.ensure_node("a.b c.d").await,
            Err(NamespaceError::InvalidName(NamingError::EmbeddedSpace(_)))
        ));
        assert!(store.is_empty());

        // Two-segment ancestor of a valid leaf is fine
        ns.ensure_node("a.b.c").await.unwrap();
        assert!(store.get_by_name("a.b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ensure_node_store_failure() {
        let (store, ns) = namespace();
        store.set_unavailable(true);
        assert!(matches!(
            ns.ensure_node("a.b.c").await,
            Err(NamespaceError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_ensure_node() {
        let (store, ns) = namespace();
        let ns = Arc::new(ns);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ns = Arc::clone(&ns);
                tokio::spawn(async move { ns.ensure_node(&format!("a.b.m{}", i % 4)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.len(), 6);
        ns.repair_children("a.b").await.unwrap();
        let ab = store.get_by_name("a.b").await.unwrap().unwrap();
        assert_eq!(ab.children.len(), 4);
    }

    #[tokio::test]
    async fn test_parent_repair_failure_does_not_abort_creation() {
        let store = Arc::new(BrokenParentIndex(MemoryNamespaceStore::new()));
        let ns = MetricNamespace::new(store.clone(), NamespaceConfig::default());

        let leaf = ns.ensure_node("a.b.c").await.unwrap();
        assert_eq!(leaf.name, "a.b.c");
        for name in ["a", "a.b", "a.b.c"] {
            assert!(store.get_by_name(name).await.unwrap().is_some(), "{} missing", name);
        }
        // Parent children stay stale until a repair succeeds
        assert!(store.get_by_name("a.b").await.unwrap().unwrap().children.is_empty());
        assert!(ns.repair_children("a.b").await.is_err());

        let link = ns.create_link("a.b", "x.y.z").await.unwrap();
        assert_eq!(link.link_target.as_deref(), Some("a.b"));
    }

    #[tokio::test]
    async fn test_create_link() {
        let (store, ns) = namespace();
        ns.ensure_node("real.x.one").await.unwrap();
        ns.ensure_node("real.x.two").await.unwrap();

        let link = ns.create_link("real.x", "alias.y.z").await.unwrap();
        assert_eq!(link.link_target.as_deref(), Some("real.x"));
        assert_eq!(link.children.len(), 2);
        assert!(ns.link_exists("real.x", "alias.y.z").await);
        assert!(!ns.link_exists("real.other", "alias.y.z").await);

        let parent = store.get_by_name("alias.y").await.unwrap().unwrap();
        assert!(parent.children.contains("alias.y.z"));
    }

    #[tokio::test]
    async fn test_create_link_is_idempotent() {
        let (store, ns) = namespace();
        ns.ensure_node("real.x.one").await.unwrap();
        ns.create_link("real.x", "alias.y.z").await.unwrap();
        let writes = store.write_count();

        ns.create_link("real.x", "alias.y.z").await.unwrap();
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_create_link_requires_target() {
        let (_store, ns) = namespace();
        assert!(matches!(
            ns.create_link("no.such.node", "alias.y.z").await,
            Err(NamespaceError::LinkTargetMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_link_snapshot_not_resynced() {
        let (store, ns) = namespace();
        ns.ensure_node("real.x.one").await.unwrap();
        ns.create_link("real.x", "alias.y.z").await.unwrap();
        ns.ensure_node("real.x.two").await.unwrap();

        let link = store.get_by_name("alias.y.z").await.unwrap().unwrap();
        assert_eq!(link.children.len(), 1);

        // Re-linking picks up the new child
        let relinked = ns.create_link("real.x", "alias.y.z").await.unwrap();
        assert_eq!(relinked.children.len(), 2);
        assert!(relinked.children.contains("real.x.two"));
    }

    #[tokio::test]
    async fn test_delete_many_leaves_parent_stale() {
        let (store, ns) = namespace();
        ns.ensure_node("a.b.c").await.unwrap();
        ns.ensure_node("a.b.d").await.unwrap();

        ns.delete_many(&["a.b.c".to_string()]).await.unwrap();
        assert!(ns.get_node("a.b.c").await.is_none());
        assert!(store.get_by_name("a.b").await.unwrap().unwrap().children.contains("a.b.c"));

        ns.repair_children("a.b").await.unwrap();
        let ab = ns.get_node("a.b").await.unwrap();
        assert!(!ab.children.contains("a.b.c"));
        assert!(ab.children.contains("a.b.d"));
    }
}
