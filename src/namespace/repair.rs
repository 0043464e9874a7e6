//! Parent/children consistency repair
//!
//! A node's recorded `children` can drift from the parent index when nodes
//! are created concurrently or deleted. The parent index is treated as the
//! truth and the recorded list is rewritten to match it.

use super::MetricNamespace;
use crate::error::NamespaceError;
use crate::metrics;

use std::collections::BTreeSet;
use tracing::{info, warn};

/// Result of a repair pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// No node with that name exists
    Missing,
    /// Recorded children already matched the parent index
    Consistent,
    /// Recorded children were rewritten
    Repaired {
        /// Names present in the parent index but not recorded
        added: Vec<String>,
        /// Names recorded but no longer in the parent index
        removed: Vec<String>,
    },
}

impl RepairOutcome {
    /// Label used in metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            RepairOutcome::Missing => "missing",
            RepairOutcome::Consistent => "consistent",
            RepairOutcome::Repaired { .. } => "repaired",
        }
    }
}

impl MetricNamespace {
    /// Rewrite `name`'s children to match the store's parent index
    ///
    /// On drift the store is updated, the cached node dropped and re-read so
    /// the cache holds the corrected record.
    pub async fn repair_children(&self, name: &str) -> Result<RepairOutcome, NamespaceError> {
        let node = match self.fetch_node(name).await? {
            Some(node) => node,
            None => {
                warn!(name = %name, "Repair requested for missing node");
                metrics::record_repair("missing");
                return Ok(RepairOutcome::Missing);
            },
        };

        let actual: BTreeSet<String> = self
            .store
            .get_by_parent(name)
            .await
            .map_err(|e| {
                metrics::record_store_error("get_by_parent");
                e
            })?
            .into_iter()
            .map(|n| n.name)
            .collect();

        if actual == node.children {
            metrics::record_repair("consistent");
            return Ok(RepairOutcome::Consistent);
        }

        let added: Vec<String> = actual.difference(&node.children).cloned().collect();
        let removed: Vec<String> = node.children.difference(&actual).cloned().collect();

        self.store.set_children(name, &actual).await.map_err(|e| {
            metrics::record_store_error("set_children");
            e
        })?;
        self.nodes.invalidate(name);
        if self.fetch_node(name).await?.is_none() {
            return Err(NamespaceError::NodeVanished(name.to_string()));
        }

        info!(
            name = %name,
            added = added.len(),
            removed = removed.len(),
            "Repaired children list"
        );
        metrics::record_repair("repaired");
        Ok(RepairOutcome::Repaired { added, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceConfig;
    use crate::store::{MemoryNamespaceStore, NamespaceStore};
    use crate::types::MetricNode;
    use std::sync::Arc;

    fn namespace() -> (Arc<MemoryNamespaceStore>, MetricNamespace) {
        let store = Arc::new(MemoryNamespaceStore::new());
        let ns = MetricNamespace::new(store.clone(), NamespaceConfig::default());
        (store, ns)
    }

    #[tokio::test]
    async fn test_missing_node() {
        let (_store, ns) = namespace();
        assert_eq!(ns.repair_children("a.b").await.unwrap(), RepairOutcome::Missing);
    }

    #[tokio::test]
    async fn test_consistent_node() {
        let (store, ns) = namespace();
        store.put_raw(MetricNode::new("a").with_children(["a.b"]));
        store.put_raw(MetricNode::new("a.b"));

        assert_eq!(ns.repair_children("a").await.unwrap(), RepairOutcome::Consistent);
    }

    #[tokio::test]
    async fn test_repairs_drift_and_refreshes_cache() {
        let (store, ns) = namespace();
        store.put_raw(MetricNode::new("a").with_children(["a.gone"]));
        store.put_raw(MetricNode::new("a.b"));
        store.put_raw(MetricNode::new("a.c"));

        // Cache the stale record first
        assert!(ns.get_node("a").await.unwrap().children.contains("a.gone"));

        let outcome = ns.repair_children("a").await.unwrap();
        assert_eq!(
            outcome,
            RepairOutcome::Repaired {
                added: vec!["a.b".to_string(), "a.c".to_string()],
                removed: vec!["a.gone".to_string()],
            }
        );

        let cached = ns.node_cache().get("a").unwrap();
        let expected: BTreeSet<String> = ["a.b", "a.c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(cached.children, expected);
        assert_eq!(store.get_by_name("a").await.unwrap().unwrap().children, expected);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let (store, ns) = namespace();
        store.put_raw(MetricNode::new("a"));
        store.set_unavailable(true);

        assert!(matches!(
            ns.repair_children("a").await,
            Err(NamespaceError::Store(_))
        ));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RepairOutcome::Missing.label(), "missing");
        assert_eq!(
            RepairOutcome::Repaired {
                added: vec![],
                removed: vec![]
            }
            .label(),
            "repaired"
        );
    }
}
