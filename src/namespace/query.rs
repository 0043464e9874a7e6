//! Recursive wildcard expansion
//!
//! A pattern is split at its first glob segment into
//! `(literal_prefix, wildcard_segment, suffix)`. The wildcard segment is
//! matched against the children of the alias-resolved prefix node and the
//! suffix is expanded recursively under each match. Links can redirect a
//! path at any level, so the expansion is done level by level rather than
//! as one regex over all names.

use super::glob::{split_on_glob, GlobPattern};
use super::MetricNamespace;
use crate::metrics;
use crate::types::NodeKind;

use futures::future::{BoxFuture, FutureExt};
use std::time::Instant;
use tracing::{debug, warn};

fn join_suffix(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", name, suffix)
    }
}

impl MetricNamespace {
    /// Expand `pattern` into the concrete names it matches
    ///
    /// Names under a link are reported with the link's prefix, not the
    /// target's. Non-empty results are cached under `pattern` for the query
    /// cache TTL.
    pub fn resolve_matches<'a>(&'a self, pattern: &'a str) -> BoxFuture<'a, Vec<String>> {
        async move {
            if pattern.is_empty() {
                return Vec::new();
            }

            let start = Instant::now();
            if let Some(cached) = self.queries.get(pattern) {
                metrics::record_query_cache(true);
                metrics::record_find(start.elapsed().as_secs_f64(), true);
                return cached;
            }
            metrics::record_query_cache(false);

            let (first, star, last) = split_on_glob(pattern);
            let matches = match star {
                None => self.match_literal(pattern).await,
                Some(star) => {
                    let glob = match GlobPattern::compile(&star) {
                        Ok(glob) => glob,
                        Err(e) => {
                            warn!(pattern = %pattern, error = %e, "Unusable glob segment");
                            return Vec::new();
                        },
                    };
                    if first.is_empty() {
                        self.match_roots(&glob, &last).await
                    } else {
                        self.match_children(&first, &glob, &last).await
                    }
                },
            };

            self.queries.put(pattern, matches.clone());
            metrics::record_find(start.elapsed().as_secs_f64(), false);
            debug!(pattern = %pattern, count = matches.len(), "Resolved query pattern");
            matches
        }
        .boxed()
    }

    /// Expand `pattern` and classify each match by its alias-resolved node
    ///
    /// Matches whose node cannot be fetched are skipped.
    pub async fn resolve_nodes(&self, pattern: &str) -> Vec<(String, NodeKind)> {
        let names = self.resolve_matches(pattern).await;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let resolved = self.resolve_alias(&name).await;
            if let Some(node) = self.get_node(&resolved.real_path).await {
                out.push((name, node.kind()));
            }
        }
        out
    }

    async fn match_literal(&self, pattern: &str) -> Vec<String> {
        let resolved = self.resolve_alias(pattern).await;
        match self.get_node(&resolved.real_path).await {
            Some(_) => vec![pattern.to_string()],
            None => Vec::new(),
        }
    }

    async fn match_roots(&self, glob: &GlobPattern, suffix: &str) -> Vec<String> {
        let mut out = Vec::new();
        for root in self.root_nodes().await {
            if glob.matches(&root.name) {
                let next = join_suffix(&root.name, suffix);
                out.extend(self.resolve_matches(&next).await);
            }
        }
        out
    }

    async fn match_children(&self, prefix: &str, glob: &GlobPattern, suffix: &str) -> Vec<String> {
        let resolved = self.resolve_alias(prefix).await;
        let node = match self.get_node(&resolved.real_path).await {
            Some(node) => node,
            None => return Vec::new(),
        };

        let child_prefix = format!("{}.", prefix);
        let mut out = Vec::new();
        for child in &node.children {
            let display = resolved.to_alias(child);
            let matched = display
                .strip_prefix(child_prefix.as_str())
                .map(|segment| glob.matches(segment))
                .unwrap_or(false);
            if matched {
                let next = join_suffix(&display, suffix);
                out.extend(self.resolve_matches(&next).await);
            }
        }
        out
    }
}
