//! Core data types used throughout the namespace index
//!
//! # Key Types
//!
//! - **`MetricNode`**: One metric name's position in the namespace tree
//! - **`NodeKind`**: Branch (has children) or leaf (no children)
//! - **`DataPoint`**: A single raw `(timestamp, value)` sample from the backing store
//!
//! # Example
//!
//! ```rust
//! use kuba_namespace::types::{parent_name, MetricNode, ROOT_PARENT};
//!
//! let node = MetricNode::new("servers.web01.cpu");
//! assert_eq!(node.parent_name, "servers.web01");
//! assert!(node.is_leaf());
//!
//! assert_eq!(parent_name("servers"), ROOT_PARENT);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Parent name recorded for top-level nodes
pub const ROOT_PARENT: &str = "root";

/// Segment separator in metric names
pub const SEPARATOR: char = '.';

/// Return the immediate parent of `name`, or [`ROOT_PARENT`] for single-segment names
pub fn parent_name(name: &str) -> &str {
    match name.rfind(SEPARATOR) {
        Some(idx) => &name[..idx],
        None => ROOT_PARENT,
    }
}

/// Return every non-empty dot-prefix of `path`, longest first
///
/// `a.b.c` yields `["a.b.c", "a.b", "a"]`.
pub fn dot_prefixes(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let segments: Vec<&str> = path.split(SEPARATOR).collect();
    (1..=segments.len())
        .rev()
        .map(|n| segments[..n].join("."))
        .collect()
}

/// A node in the metric namespace
///
/// `children` holds immediate child names. For a link node it is a snapshot
/// of the target's children taken when the link was written and is not
/// refreshed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNode {
    /// Full dotted name, unique
    pub name: String,
    /// Name of the immediate ancestor, or [`ROOT_PARENT`]
    pub parent_name: String,
    /// Immediate child names
    pub children: BTreeSet<String>,
    /// Name this node aliases to, if it is a link
    pub link_target: Option<String>,
    /// Reserved, not interpreted
    pub expiry: Option<i64>,
}

impl MetricNode {
    /// Create a fresh node with no children and no link
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let parent = parent_name(&name).to_string();
        Self {
            name,
            parent_name: parent,
            children: BTreeSet::new(),
            link_target: None,
            expiry: None,
        }
    }

    /// Builder-style helper to attach children
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper to make this node a link
    pub fn with_link(mut self, target: impl Into<String>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    /// True if the node currently records no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if the node carries a link target
    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }

    /// Branch or leaf, from the recorded children
    pub fn kind(&self) -> NodeKind {
        if self.is_leaf() {
            NodeKind::Leaf
        } else {
            NodeKind::Branch
        }
    }
}

impl fmt::Display for MetricNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<MetricNode {} ", self.name)?;
        if self.children.len() > 10 {
            write!(f, "children: {}", self.children.len())?;
        } else {
            write!(f, "children: {:?}", self.children)?;
        }
        if let Some(target) = &self.link_target {
            write!(f, " -> {}", target)?;
        }
        write!(f, ">")
    }
}

/// Classification of a query match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Node with at least one child
    Branch,
    /// Node with no children
    Leaf,
}

impl NodeKind {
    /// True for [`NodeKind::Leaf`]
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Leaf)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Branch => write!(f, "branch"),
            NodeKind::Leaf => write!(f, "leaf"),
        }
    }
}

/// A single raw sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Timestamp, in the unit of the surrounding call (seconds on the query path)
    pub timestamp: i64,
    /// Sample value
    pub value: f64,
}

impl DataPoint {
    /// Create a new data point
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for DataPoint {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}
