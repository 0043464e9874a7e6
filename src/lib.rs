//! Kuba Namespace - hierarchical metric name index for Graphite-style queries
//!
//! This library provides:
//! - A dot-separated metric namespace kept in an external store (Redis or memory)
//! - Wildcard query resolution with per-segment shell globs
//! - Symbolic links between subtrees, followed transparently by queries
//! - Lazy creation of missing ancestors and children-list repair
//! - Fixed-step resampling of raw series fetched from KairosDB

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod naming;
pub mod namespace;
pub mod resample;
pub mod store;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Redis-backed namespace store with pooled connections
pub mod redis;

/// Datapoint fetching: KairosDB client, worker pool and finder surface
pub mod fetch;

/// Measurement ingestion: validation, name registration and forwarding
pub mod ingest;

// Re-export main types
pub use error::{Error, Result};
pub use namespace::{MetricNamespace, NamespaceConfig};
pub use types::{DataPoint, MetricNode, NodeKind};
