//! Prometheus metrics for the namespace index
//!
//! Counters cover cache effectiveness, repair activity, node creation and
//! store failures; histograms cover datapoint fetches and query resolution.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // === Cache Counters ===

    /// Node cache lookups by result
    pub static ref NODE_CACHE_LOOKUPS: CounterVec = register_counter_vec!(
        "kns_node_cache_lookups_total",
        "Node cache lookups by result",
        &["result"]
    ).expect("kns_node_cache_lookups_total registers once");

    /// Query cache lookups by result
    pub static ref QUERY_CACHE_LOOKUPS: CounterVec = register_counter_vec!(
        "kns_query_cache_lookups_total",
        "Query cache lookups by result",
        &["result"]
    ).expect("kns_query_cache_lookups_total registers once");

    // === Namespace Counters ===

    /// Children repairs by outcome
    pub static ref REPAIRS_TOTAL: CounterVec = register_counter_vec!(
        "kns_repairs_total",
        "Children list repairs by outcome",
        &["outcome"]
    ).expect("kns_repairs_total registers once");

    /// Nodes written by kind of creation
    pub static ref NODES_CREATED: CounterVec = register_counter_vec!(
        "kns_nodes_created_total",
        "Nodes created by kind",
        &["kind"]
    ).expect("kns_nodes_created_total registers once");

    /// Store failures by operation
    pub static ref STORE_ERRORS: CounterVec = register_counter_vec!(
        "kns_store_errors_total",
        "Namespace store failures by operation",
        &["operation"]
    ).expect("kns_store_errors_total registers once");

    /// Ingested points by status
    pub static ref INGESTED_POINTS: CounterVec = register_counter_vec!(
        "kns_ingested_points_total",
        "Ingested measurement points by status",
        &["status"]
    ).expect("kns_ingested_points_total registers once");

    // === Latency Histograms ===

    /// Datapoint fetch duration
    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec!(
        "kns_fetch_duration_seconds",
        "Datapoint fetch and resample latency in seconds",
        &["status"],
        vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]
    ).expect("kns_fetch_duration_seconds registers once");

    /// Pattern resolution duration
    pub static ref FIND_DURATION: HistogramVec = register_histogram_vec!(
        "kns_find_duration_seconds",
        "Wildcard query resolution latency in seconds",
        &["cache"],
        vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0]
    ).expect("kns_find_duration_seconds registers once");

    // === System Health ===

    /// Health status (0=unhealthy, 1=healthy)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "kns_health_status",
        "Service health status (0=unhealthy, 1=healthy)"
    ).expect("kns_health_status registers once");

    /// Fetch jobs currently running
    pub static ref FETCHES_IN_FLIGHT: Gauge = register_gauge!(
        "kns_fetches_in_flight",
        "Datapoint fetch jobs currently holding a worker permit"
    ).expect("kns_fetches_in_flight registers once");
}

/// Initialize metrics system
pub fn init() {
    HEALTH_STATUS.set(1.0);
    FETCHES_IN_FLIGHT.set(0.0);
    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

#[inline]
fn hit_label(hit: bool) -> &'static str {
    if hit {
        "hit"
    } else {
        "miss"
    }
}

/// Record `count` node cache lookups with the same result
#[inline]
pub fn record_node_cache(hit: bool, count: usize) {
    if count > 0 {
        NODE_CACHE_LOOKUPS
            .with_label_values(&[hit_label(hit)])
            .inc_by(count as f64);
    }
}

/// Record a query cache lookup
#[inline]
pub fn record_query_cache(hit: bool) {
    QUERY_CACHE_LOOKUPS.with_label_values(&[hit_label(hit)]).inc();
}

/// Record a repair outcome (`missing`, `consistent`, `repaired`)
#[inline]
pub fn record_repair(outcome: &str) {
    REPAIRS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a created node (`leaf`, `ancestor`, `link`)
#[inline]
pub fn record_node_created(kind: &str) {
    NODES_CREATED.with_label_values(&[kind]).inc();
}

/// Record a store failure
#[inline]
pub fn record_store_error(operation: &str) {
    STORE_ERRORS.with_label_values(&[operation]).inc();
}

/// Record ingested points
#[inline]
pub fn record_ingested(status: &str, count: usize) {
    INGESTED_POINTS
        .with_label_values(&[status])
        .inc_by(count as f64);
}

/// Record a datapoint fetch
#[inline]
pub fn record_fetch(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };
    FETCH_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record a pattern resolution
#[inline]
pub fn record_find(duration_secs: f64, cached: bool) {
    FIND_DURATION
        .with_label_values(&[hit_label(cached)])
        .observe(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init();
        assert_eq!(HEALTH_STATUS.get(), 1.0);
    }

    #[test]
    fn test_record_repair() {
        record_repair("repaired");
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("kns_repairs_total"));
    }

    #[test]
    fn test_cache_counters() {
        let before = NODE_CACHE_LOOKUPS.with_label_values(&["miss"]).get();
        record_node_cache(false, 1);
        assert_eq!(
            NODE_CACHE_LOOKUPS.with_label_values(&["miss"]).get(),
            before + 1.0
        );
    }

    #[test]
    fn test_gather_metrics() {
        init();
        record_fetch(0.02, true);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("kns_health_status"));
        assert!(metrics.contains("kns_fetch_duration_seconds"));
    }
}
