//! Link-aware path resolution
//!
//! A path may pass through a link partway down, e.g. `siteA.web` linked to
//! `clusterX.frontend`, so `siteA.web.latency` resolves to
//! `clusterX.frontend.latency`.

use super::MetricNamespace;
use crate::types::dot_prefixes;

/// Outcome of alias resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Path with the linked prefix substituted, or the input unchanged
    pub real_path: String,
    /// Target of the link that was followed
    pub link_target: Option<String>,
    /// Name of the link node that was followed
    pub link_prefix: Option<String>,
}

impl ResolvedPath {
    /// Resolution that followed no link
    pub fn unchanged(path: impl Into<String>) -> Self {
        Self {
            real_path: path.into(),
            link_target: None,
            link_prefix: None,
        }
    }

    /// True if a link was followed
    pub fn is_aliased(&self) -> bool {
        self.link_target.is_some()
    }

    /// Map a real name under the link target back to its alias-prefixed form
    ///
    /// Only the leading target segments are rewritten; a later repeat of the
    /// target inside the name is kept. Names not under the target are
    /// returned unchanged.
    pub fn to_alias(&self, real_name: &str) -> String {
        match (&self.link_target, &self.link_prefix) {
            (Some(target), Some(prefix)) => match real_name.strip_prefix(target.as_str()) {
                Some(rest) if rest.is_empty() || rest.starts_with('.') => format!("{}{}", prefix, rest),
                _ => real_name.to_string(),
            },
            _ => real_name.to_string(),
        }
    }
}

impl MetricNamespace {
    /// Resolve `path` through the longest linked prefix, if any
    ///
    /// Looks at every dot-prefix of `path`, longest first. An exact,
    /// unlinked record for `path` itself wins and leaves it unchanged;
    /// otherwise the longest prefix that carries a link has its first
    /// occurrence in `path` replaced by the link target. With no existing
    /// prefix the path is returned unchanged.
    pub async fn resolve_alias(&self, path: &str) -> ResolvedPath {
        if let Some(fragment) = &self.config.linkable_fragment {
            if !path.contains(fragment.as_str()) {
                return ResolvedPath::unchanged(path);
            }
        }

        let prefixes = dot_prefixes(path);
        if prefixes.is_empty() {
            return ResolvedPath::unchanged(path);
        }

        let mut records = self.get_nodes(&prefixes).await;
        records.sort_by(|a, b| b.name.len().cmp(&a.name.len()));

        for record in records {
            match &record.link_target {
                None if record.name == path => return ResolvedPath::unchanged(path),
                None => continue,
                Some(target) => {
                    return ResolvedPath {
                        real_path: path.replacen(record.name.as_str(), target, 1),
                        link_target: Some(target.clone()),
                        link_prefix: Some(record.name),
                    };
                },
            }
        }

        ResolvedPath::unchanged(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceConfig;
    use crate::store::MemoryNamespaceStore;
    use crate::types::MetricNode;
    use std::sync::Arc;

    fn namespace_with(nodes: Vec<MetricNode>, config: NamespaceConfig) -> MetricNamespace {
        let store = Arc::new(MemoryNamespaceStore::new());
        for node in nodes {
            store.put_raw(node);
        }
        MetricNamespace::new(store, config)
    }

    fn linked_tree() -> Vec<MetricNode> {
        vec![
            MetricNode::new("siteA"),
            MetricNode::new("siteA.web").with_link("clusterX.frontend"),
            MetricNode::new("clusterX"),
            MetricNode::new("clusterX.frontend").with_children(["clusterX.frontend.latency"]),
            MetricNode::new("clusterX.frontend.latency"),
        ]
    }

    #[tokio::test]
    async fn test_follows_linked_prefix() {
        let ns = namespace_with(linked_tree(), NamespaceConfig::default());
        let resolved = ns.resolve_alias("siteA.web.latency").await;

        assert_eq!(resolved.real_path, "clusterX.frontend.latency");
        assert_eq!(resolved.link_target.as_deref(), Some("clusterX.frontend"));
        assert_eq!(resolved.link_prefix.as_deref(), Some("siteA.web"));
        assert!(resolved.is_aliased());
    }

    #[tokio::test]
    async fn test_link_node_itself_resolves() {
        let ns = namespace_with(linked_tree(), NamespaceConfig::default());
        let resolved = ns.resolve_alias("siteA.web").await;
        assert_eq!(resolved.real_path, "clusterX.frontend");
    }

    #[tokio::test]
    async fn test_exact_unlinked_match_is_unchanged() {
        let ns = namespace_with(linked_tree(), NamespaceConfig::default());
        let resolved = ns.resolve_alias("clusterX.frontend.latency").await;
        assert_eq!(resolved, ResolvedPath::unchanged("clusterX.frontend.latency"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_unchanged() {
        let ns = namespace_with(linked_tree(), NamespaceConfig::default());
        assert_eq!(
            ns.resolve_alias("nowhere.at.all").await,
            ResolvedPath::unchanged("nowhere.at.all")
        );
        assert_eq!(ns.resolve_alias("").await, ResolvedPath::unchanged(""));
    }

    #[tokio::test]
    async fn test_linkable_fragment_short_circuit() {
        let config = NamespaceConfig {
            linkable_fragment: Some("sites".to_string()),
            ..Default::default()
        };
        let ns = namespace_with(linked_tree(), config);

        // No "sites" in the path: resolution skipped
        assert!(!ns.resolve_alias("siteA.web.latency").await.is_aliased());
    }

    #[tokio::test]
    async fn test_linkable_fragment_present_still_resolves() {
        let config = NamespaceConfig {
            linkable_fragment: Some("sites".to_string()),
            ..Default::default()
        };
        let ns = namespace_with(
            vec![
                MetricNode::new("obu.sites.a").with_link("obu.hosts.h1"),
                MetricNode::new("obu.hosts.h1"),
            ],
            config,
        );
        let resolved = ns.resolve_alias("obu.sites.a.cpu").await;
        assert_eq!(resolved.real_path, "obu.hosts.h1.cpu");
    }

    #[test]
    fn test_to_alias() {
        let resolved = ResolvedPath {
            real_path: "b.x".to_string(),
            link_target: Some("b".to_string()),
            link_prefix: Some("a".to_string()),
        };
        assert_eq!(resolved.to_alias("b.x.y"), "a.x.y");
        assert_eq!(resolved.to_alias("b"), "a");
        assert_eq!(ResolvedPath::unchanged("b").to_alias("b.x"), "b.x");
    }

    #[test]
    fn test_to_alias_rewrites_leading_target_only() {
        let resolved = ResolvedPath {
            real_path: "b.x".to_string(),
            link_target: Some("b".to_string()),
            link_prefix: Some("a".to_string()),
        };
        assert_eq!(resolved.to_alias("b.x.b"), "a.x.b");
        assert_eq!(resolved.to_alias("bb.x"), "bb.x");
        assert_eq!(resolved.to_alias("c.b"), "c.b");
    }
}
