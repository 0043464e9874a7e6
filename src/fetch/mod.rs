//! Datapoint retrieval for leaf metrics
//!
//! The namespace only knows names. Values live in a separate datapoint
//! store (KairosDB in production) reached through [`DatapointSource`].
//! Fetches are dispatched to a bounded [`FetchPool`] and resampled onto a
//! fixed step before they are handed back as a [`SeriesWindow`].

mod finder;
mod kairosdb;
mod pool;

pub use finder::{Finder, FinderEntry, FinderNode, LeafReader};
pub use kairosdb::{KairosDbClient, DEFAULT_REQUEST_TIMEOUT};
pub use pool::{FetchInProgress, FetchPool, DEFAULT_FETCH_WORKERS};

use crate::error::FetchError;
use crate::ingest::{DatapointSink, KairosDatapoint};
use crate::resample::Resampled;
use crate::types::DataPoint;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Raw datapoint lookup by metric name and time range
#[async_trait]
pub trait DatapointSource: Send + Sync + 'static {
    /// Identifier for logs
    fn source_id(&self) -> &str;

    /// Time-ordered points for `metric` in roughly `[start, end]`, in seconds
    async fn query_datapoints(
        &self,
        metric: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<DataPoint>, FetchError>;
}

/// A resampled series for one leaf over a requested window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesWindow {
    /// Requested window start (seconds)
    pub start: i64,
    /// Requested window end (seconds)
    pub end: i64,
    /// Seconds between values
    pub step: i64,
    /// One value per step, `None` where nothing new arrived
    pub values: Vec<Option<f64>>,
}

impl SeriesWindow {
    /// Window with no data
    pub fn empty(start: i64, end: i64) -> Self {
        Self::from_resampled(start, end, Resampled::empty())
    }

    /// Wrap a resampler result
    pub fn from_resampled(start: i64, end: i64, resampled: Resampled) -> Self {
        Self {
            start,
            end,
            step: resampled.step,
            values: resampled.values,
        }
    }
}

/// In-process datapoint store
///
/// Used by tests and by the server's memory backend. Writes through
/// [`DatapointSink`] convert millisecond timestamps back to seconds.
#[derive(Default)]
pub struct MemoryDatapointSource {
    series: RwLock<HashMap<String, Vec<DataPoint>>>,
    unavailable: AtomicBool,
}

impl MemoryDatapointSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Append points to `metric`, keeping the series time-ordered
    pub fn insert(&self, metric: &str, points: impl IntoIterator<Item = DataPoint>) {
        let mut series = self.series.write();
        let entry = series.entry(metric.to_string()).or_default();
        entry.extend(points);
        entry.sort_by_key(|p| p.timestamp);
    }

    /// Number of points stored for `metric`
    pub fn point_count(&self, metric: &str) -> usize {
        self.series.read().get(metric).map(Vec::len).unwrap_or(0)
    }

    /// While `true`, queries and writes fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), FetchError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FetchError::Http("memory source marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DatapointSource for MemoryDatapointSource {
    fn source_id(&self) -> &str {
        "memory"
    }

    async fn query_datapoints(
        &self,
        metric: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<DataPoint>, FetchError> {
        self.check_available()?;
        // Same one-second lead-in the KairosDB query applies
        let from = start.saturating_sub(1);
        Ok(self
            .series
            .read()
            .get(metric)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= from && p.timestamp <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl DatapointSink for MemoryDatapointSource {
    async fn write_datapoints(&self, batch: &[KairosDatapoint]) -> Result<(), FetchError> {
        self.check_available()?;
        for dp in batch {
            self.insert(&dp.name, [DataPoint::new(dp.timestamp / 1000, dp.value)]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_range() {
        let source = MemoryDatapointSource::new();
        source.insert(
            "a.b.c",
            [DataPoint::new(5, 1.0), DataPoint::new(9, 2.0), DataPoint::new(20, 3.0), DataPoint::new(10, 4.0)],
        );

        let points = source.query_datapoints("a.b.c", 10, 20).await.unwrap();
        let stamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![9, 10, 20]);

        assert!(source.query_datapoints("x.y.z", 0, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_source_unavailable() {
        let source = MemoryDatapointSource::new();
        source.set_unavailable(true);
        assert!(source.query_datapoints("a.b.c", 0, 10).await.is_err());
    }

    #[test]
    fn test_series_window_empty() {
        let window = SeriesWindow::empty(100, 200);
        assert_eq!(window.step, 1);
        assert!(window.values.is_empty());
        assert_eq!((window.start, window.end), (100, 200));
    }
}
