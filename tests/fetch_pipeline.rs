//! Ingest-to-render integration tests
//!
//! Wires the namespace, the ingestion pipeline and the fetch pool together
//! over in-memory backends, the same way the server does.

use async_trait::async_trait;
use kuba_namespace::error::FetchError;
use kuba_namespace::fetch::{
    DatapointSource, FetchPool, Finder, FinderNode, MemoryDatapointSource, SeriesWindow,
};
use kuba_namespace::ingest::{IngestPipeline, MeasurementEvent};
use kuba_namespace::namespace::{MetricNamespace, NamespaceConfig};
use kuba_namespace::store::MemoryNamespaceStore;
use kuba_namespace::types::DataPoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Stack {
    namespace: Arc<MetricNamespace>,
    datapoints: Arc<MemoryDatapointSource>,
    pipeline: IngestPipeline,
    finder: Finder,
}

fn stack() -> Stack {
    let store = Arc::new(MemoryNamespaceStore::new());
    let namespace = Arc::new(MetricNamespace::new(store, NamespaceConfig::default()));
    let datapoints = Arc::new(MemoryDatapointSource::new());
    let pipeline = IngestPipeline::new(namespace.clone(), datapoints.clone());
    let finder = Finder::new(namespace.clone(), FetchPool::new(datapoints.clone(), 4));
    Stack {
        namespace,
        datapoints,
        pipeline,
        finder,
    }
}

async fn render(finder: &Finder, target: &str, from: i64, until: i64) -> Vec<(String, SeriesWindow)> {
    let pending: Vec<_> = finder
        .find_nodes(target)
        .await
        .into_iter()
        .filter_map(|node| match node {
            FinderNode::Leaf { path, reader } => Some((path, reader.fetch(from, until))),
            FinderNode::Branch { .. } => None,
        })
        .collect();

    let mut out = Vec::new();
    for (path, fetch) in pending {
        out.push((path, fetch.wait().await));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[tokio::test]
async fn test_ingested_points_are_findable_and_renderable() {
    let s = stack();
    let events = vec![
        MeasurementEvent::raw("servers.web01.cpu", 10.0, 1000),
        MeasurementEvent::raw("servers.web01.cpu", 20.0, 1002),
        MeasurementEvent::raw("servers.web01.cpu", 30.0, 1005),
        MeasurementEvent::raw("servers.web02.cpu", 1.0, 1000),
    ];
    let report = s.pipeline.ingest(&events).await.unwrap();
    assert_eq!(report.accepted, 4);

    let branches = s.finder.find_nodes("servers.*").await;
    assert_eq!(branches.len(), 2);
    assert!(branches.iter().all(|n| !n.is_leaf()));

    let series = render(&s.finder, "servers.*.cpu", 1000, 1006).await;
    assert_eq!(series.len(), 2);

    let (path, web01) = &series[0];
    assert_eq!(path, "servers.web01.cpu");
    assert_eq!(web01.step, 2);
    assert_eq!(web01.values, vec![Some(10.0), Some(20.0), None]);

    // Single point: returned as-is
    let (_, web02) = &series[1];
    assert_eq!(web02.values, vec![Some(1.0)]);
}

#[tokio::test]
async fn test_render_through_link_reads_target_series() {
    let s = stack();
    s.pipeline
        .ingest(&[
            MeasurementEvent::raw("cluster.frontend.latency", 5.0, 0),
            MeasurementEvent::raw("cluster.frontend.latency", 6.0, 1),
            MeasurementEvent::raw("cluster.frontend.latency", 7.0, 2),
        ])
        .await
        .unwrap();
    s.namespace
        .create_link("cluster.frontend", "site.a.web")
        .await
        .unwrap();

    let series = render(&s.finder, "site.a.web.*", 0, 3).await;
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].0, "site.a.web.latency");
    assert_eq!(series[0].1.values, vec![Some(5.0), Some(6.0), None]);
}

#[tokio::test]
async fn test_datapoint_outage_yields_empty_windows() {
    let s = stack();
    s.pipeline
        .ingest(&[MeasurementEvent::raw("a.b.c", 1.0, 10)])
        .await
        .unwrap();
    s.datapoints.set_unavailable(true);

    let series = render(&s.finder, "a.b.*", 0, 20).await;
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].1, SeriesWindow::empty(0, 20));
}

/// Source that records the peak number of overlapping queries
struct SlowSource {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl DatapointSource for SlowSource {
    fn source_id(&self) -> &str {
        "slow"
    }

    async fn query_datapoints(
        &self,
        _metric: &str,
        start: i64,
        _end: i64,
    ) -> Result<Vec<DataPoint>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![DataPoint::new(start, 1.0)])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency() {
    let source = Arc::new(SlowSource {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let pool = FetchPool::new(source.clone(), 3);

    let handles: Vec<_> = (0..12)
        .map(|i| pool.dispatch(&format!("m.n.{}", i), 0, 10))
        .collect();
    for handle in handles {
        assert_eq!(handle.wait().await.values, vec![Some(1.0)]);
    }

    let peak = source.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 3, "peak concurrency {}", peak);
    assert_eq!(pool.idle_workers(), 3);
}
