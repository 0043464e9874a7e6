//! Bounded worker pool for datapoint fetches
//!
//! A render request can touch hundreds of leaves. Each leaf fetch runs as
//! its own task, but only `workers` of them hold a permit and talk to the
//! datapoint store at once. Callers get a [`FetchInProgress`] handle back
//! immediately and join it when they need the values.

use super::{DatapointSource, SeriesWindow};
use crate::metrics::{self, FETCHES_IN_FLIGHT};
use crate::resample::{resample_capped, DEFAULT_MAX_SLOTS};

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of concurrent fetches
pub const DEFAULT_FETCH_WORKERS: usize = 10;

/// Dispatches fetch-and-resample jobs onto the tokio runtime
#[derive(Clone)]
pub struct FetchPool {
    source: Arc<dyn DatapointSource>,
    permits: Arc<Semaphore>,
    workers: usize,
    max_slots: usize,
}

impl FetchPool {
    /// Create a pool allowing `workers` concurrent fetches (at least one)
    pub fn new(source: Arc<dyn DatapointSource>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            source,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            max_slots: DEFAULT_MAX_SLOTS,
        }
    }

    /// Cap the number of slots in each resampled window (at least one)
    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots.max(1);
        self
    }

    /// Slot cap applied when resampling
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Configured concurrency
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Permits not currently held by a running fetch
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// The datapoint store behind this pool
    pub fn source(&self) -> &Arc<dyn DatapointSource> {
        &self.source
    }

    /// Queue a fetch of `metric` over `[start, end)`
    ///
    /// Must be called from within a tokio runtime. The job runs to
    /// completion even if the handle is dropped.
    pub fn dispatch(&self, metric: &str, start: i64, end: i64) -> FetchInProgress {
        let source = Arc::clone(&self.source);
        let permits = Arc::clone(&self.permits);
        let metric = metric.to_string();
        let max_slots = self.max_slots;

        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(metric = %metric, "Fetch pool closed");
                    return SeriesWindow::empty(start, end);
                },
            };

            FETCHES_IN_FLIGHT.inc();
            let started = Instant::now();
            let result = source.query_datapoints(&metric, start, end).await;
            let elapsed = started.elapsed().as_secs_f64();
            FETCHES_IN_FLIGHT.dec();

            match result {
                Ok(points) => {
                    metrics::record_fetch(elapsed, true);
                    debug!(metric = %metric, points = points.len(), "Resampling fetched series");
                    SeriesWindow::from_resampled(
                        start,
                        end,
                        resample_capped(&points, start, end, max_slots),
                    )
                },
                Err(e) => {
                    metrics::record_fetch(elapsed, false);
                    warn!(
                        metric = %metric,
                        source = %source.source_id(),
                        error = %e,
                        "Datapoint fetch failed, returning empty series"
                    );
                    SeriesWindow::empty(start, end)
                },
            }
        });

        FetchInProgress { handle, start, end }
    }
}

/// Handle to a dispatched fetch
#[must_use = "a fetch does nothing useful until it is waited on"]
pub struct FetchInProgress {
    handle: JoinHandle<SeriesWindow>,
    start: i64,
    end: i64,
}

impl FetchInProgress {
    /// Wait for the job and return its window
    ///
    /// A job that panicked yields the empty window.
    pub async fn wait(self) -> SeriesWindow {
        match self.handle.await {
            Ok(window) => window,
            Err(e) => {
                warn!(error = %e, "Fetch task did not complete");
                SeriesWindow::empty(self.start, self.end)
            },
        }
    }

    /// True once the job has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
