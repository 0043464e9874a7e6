//! Measurement ingestion
//!
//! Incoming events are JSON objects of the form
//!
//! ```json
//! {"eventType": "measurement", "metricType": "raw", "metric": "a.b.c", "value": 1.5, "timestamp": 1700000000}
//! ```
//!
//! Each accepted event has its metric name sanitized, is registered in the
//! namespace (creating any missing ancestors) and is forwarded to a
//! [`DatapointSink`] as a KairosDB datapoint. Bad events are logged and
//! dropped without failing the rest of the batch.

use crate::error::{Error, FetchError, Result};
use crate::metrics;
use crate::namespace::MetricNamespace;
use crate::naming::sanitize_metric_name;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Accepted `eventType`
pub const MEASUREMENT_EVENT: &str = "measurement";

/// Accepted `metricType`
pub const RAW_METRIC: &str = "raw";

/// Tag key naming the process that wrote a datapoint
pub const RECEIVER_TAG: &str = "receiver";

/// Default value of the receiver tag
pub const DEFAULT_RECEIVER: &str = "kuba-namespace";

/// One incoming event
///
/// Every field is optional on the wire so a malformed event can be rejected
/// on its own instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementEvent {
    /// Must be `measurement`
    #[serde(default)]
    pub event_type: Option<String>,
    /// Must be `raw`
    #[serde(default)]
    pub metric_type: Option<String>,
    /// Dotted metric name
    #[serde(default)]
    pub metric: Option<String>,
    /// Sample value
    #[serde(default)]
    pub value: Option<f64>,
    /// Seconds since the epoch; fractions are dropped
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl MeasurementEvent {
    /// A raw measurement event
    pub fn raw(metric: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            event_type: Some(MEASUREMENT_EVENT.to_string()),
            metric_type: Some(RAW_METRIC.to_string()),
            metric: Some(metric.into()),
            value: Some(value),
            timestamp: Some(timestamp as f64),
        }
    }
}

/// A datapoint in KairosDB's write format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KairosDatapoint {
    /// Metric name
    pub name: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    /// Sample value
    pub value: f64,
    /// Tags; KairosDB requires at least one
    pub tags: BTreeMap<String, String>,
}

/// Destination for accepted datapoints
#[async_trait]
pub trait DatapointSink: Send + Sync + 'static {
    /// Write a batch; the whole batch succeeds or fails together
    async fn write_datapoints(&self, batch: &[KairosDatapoint]) -> std::result::Result<(), FetchError>;
}

/// Per-batch counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Events in the batch
    pub received: usize,
    /// Events registered and written
    pub accepted: usize,
    /// Events dropped
    pub rejected: usize,
}

/// Validates events, registers their names and forwards them to a sink
pub struct IngestPipeline {
    namespace: Arc<MetricNamespace>,
    sink: Arc<dyn DatapointSink>,
    receiver: String,
}

impl IngestPipeline {
    /// Create a pipeline tagging datapoints with [`DEFAULT_RECEIVER`]
    pub fn new(namespace: Arc<MetricNamespace>, sink: Arc<dyn DatapointSink>) -> Self {
        Self {
            namespace,
            sink,
            receiver: DEFAULT_RECEIVER.to_string(),
        }
    }

    /// Override the receiver tag value
    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = receiver.into();
        self
    }

    /// Receiver tag value
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Ingest a batch
    ///
    /// Only a sink failure is returned as an error; names registered before
    /// the failure stay registered.
    pub async fn ingest(&self, events: &[MeasurementEvent]) -> Result<IngestReport> {
        let mut report = IngestReport {
            received: events.len(),
            ..IngestReport::default()
        };

        let mut batch = Vec::with_capacity(events.len());
        for event in events {
            match self.convert(event).await {
                Some(dp) => batch.push(dp),
                None => report.rejected += 1,
            }
        }
        metrics::record_ingested("rejected", report.rejected);

        if batch.is_empty() {
            debug!(received = report.received, "No datapoints to write");
            return Ok(report);
        }

        if let Err(e) = self.sink.write_datapoints(&batch).await {
            warn!(count = batch.len(), error = %e, "Datapoint write failed");
            metrics::record_ingested("failed", batch.len());
            return Err(Error::Fetch(e));
        }

        report.accepted = batch.len();
        metrics::record_ingested("accepted", report.accepted);
        info!(
            received = report.received,
            accepted = report.accepted,
            rejected = report.rejected,
            "Ingested batch"
        );
        Ok(report)
    }

    async fn convert(&self, event: &MeasurementEvent) -> Option<KairosDatapoint> {
        if event.event_type.as_deref() != Some(MEASUREMENT_EVENT) {
            debug!(event = ?event, "Skipping non-measurement event");
            return None;
        }
        if event.metric_type.as_deref() != Some(RAW_METRIC) {
            debug!(event = ?event, "Skipping non-raw measurement");
            return None;
        }

        let (raw_name, value, timestamp) = match (&event.metric, event.value, event.timestamp) {
            (Some(name), Some(value), Some(ts)) if value.is_finite() && ts.is_finite() => {
                (name, value, ts as i64)
            },
            _ => {
                warn!(event = ?event, "Incomplete measurement");
                return None;
            },
        };

        let timestamp_ms = match timestamp.checked_mul(1000) {
            Some(ms) => ms,
            None => {
                warn!(metric = %raw_name, timestamp, "Timestamp out of range");
                return None;
            },
        };

        let name = sanitize_metric_name(raw_name);
        if let Err(e) = self.namespace.ensure_node(&name).await {
            warn!(metric = %raw_name, error = %e, "Rejected measurement");
            return None;
        }

        let mut tags = BTreeMap::new();
        tags.insert(RECEIVER_TAG.to_string(), self.receiver.clone());
        Some(KairosDatapoint {
            name,
            timestamp: timestamp_ms,
            value,
            tags,
        })
    }
}
