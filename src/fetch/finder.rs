//! Host-facing find surface
//!
//! Maps wildcard matches onto branch and leaf nodes. Leaves carry a reader
//! that fetches their series through the shared pool, using the
//! alias-resolved name so a linked path reads the target's data.

use super::{FetchInProgress, FetchPool};
use crate::namespace::MetricNamespace;
use crate::types::NodeKind;

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Reads one leaf's series
#[derive(Clone)]
pub struct LeafReader {
    real_path: String,
    pool: FetchPool,
}

impl LeafReader {
    /// Name the datapoint store is queried with
    pub fn real_path(&self) -> &str {
        &self.real_path
    }

    /// Dispatch a fetch over `[start, end)` seconds
    pub fn fetch(&self, start: i64, end: i64) -> FetchInProgress {
        self.pool.dispatch(&self.real_path, start, end)
    }
}

impl std::fmt::Debug for LeafReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafReader")
            .field("real_path", &self.real_path)
            .finish()
    }
}

/// A matched node
#[derive(Debug, Clone)]
pub enum FinderNode {
    /// Node with children
    Branch {
        /// Path as seen by the caller
        path: String,
    },
    /// Node without children
    Leaf {
        /// Path as seen by the caller
        path: String,
        /// Reader for the leaf's values
        reader: LeafReader,
    },
}

impl FinderNode {
    /// Path as seen by the caller
    pub fn path(&self) -> &str {
        match self {
            FinderNode::Branch { path } | FinderNode::Leaf { path, .. } => path,
        }
    }

    /// True for leaves
    pub fn is_leaf(&self) -> bool {
        matches!(self, FinderNode::Leaf { .. })
    }

    /// Last dot-segment of the path
    pub fn label(&self) -> &str {
        let path = self.path();
        path.rsplit('.').next().unwrap_or(path)
    }
}

/// Serializable summary of a [`FinderNode`]
#[derive(Debug, Clone, Serialize)]
pub struct FinderEntry {
    /// Full path
    pub path: String,
    /// Last segment
    pub text: String,
    /// True for leaves
    pub leaf: bool,
}

impl From<&FinderNode> for FinderEntry {
    fn from(node: &FinderNode) -> Self {
        Self {
            path: node.path().to_string(),
            text: node.label().to_string(),
            leaf: node.is_leaf(),
        }
    }
}

/// Pattern lookup over the namespace, with leaf readers bound to a fetch pool
#[derive(Clone)]
pub struct Finder {
    namespace: Arc<MetricNamespace>,
    pool: FetchPool,
}

impl Finder {
    /// Create a finder
    pub fn new(namespace: Arc<MetricNamespace>, pool: FetchPool) -> Self {
        Self { namespace, pool }
    }

    /// The namespace searched
    pub fn namespace(&self) -> &Arc<MetricNamespace> {
        &self.namespace
    }

    /// The pool leaf readers dispatch to
    pub fn pool(&self) -> &FetchPool {
        &self.pool
    }

    /// All nodes matching `pattern`
    pub async fn find_nodes(&self, pattern: &str) -> Vec<FinderNode> {
        let started = Instant::now();
        let matches = self.namespace.resolve_nodes(pattern).await;

        let mut nodes = Vec::with_capacity(matches.len());
        for (path, kind) in matches {
            let node = match kind {
                NodeKind::Branch => FinderNode::Branch { path },
                NodeKind::Leaf => {
                    let real_path = self.namespace.resolve_alias(&path).await.real_path;
                    FinderNode::Leaf {
                        path,
                        reader: LeafReader {
                            real_path,
                            pool: self.pool.clone(),
                        },
                    }
                },
            };
            nodes.push(node);
        }

        info!(
            pattern = %pattern,
            matches = nodes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "find_nodes"
        );
        nodes
    }
}
