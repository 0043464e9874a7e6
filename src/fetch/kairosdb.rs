//! KairosDB REST client
//!
//! Reads go through `POST /api/v1/datapoints/query` with an absolute window
//! in milliseconds and no aggregation; writes go through
//! `POST /api/v1/datapoints`, which answers `204 No Content` on success.

use super::DatapointSource;
use crate::error::FetchError;
use crate::ingest::{DatapointSink, KairosDatapoint};
use crate::types::DataPoint;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest response body kept in a status error
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    start_absolute: i64,
    end_absolute: i64,
    metrics: [QueryMetric<'a>; 1],
}

#[derive(Debug, Serialize)]
struct QueryMetric<'a> {
    name: &'a str,
    tags: BTreeMap<String, Vec<String>>,
    aggregators: Vec<serde_json::Value>,
}

impl<'a> QueryRequest<'a> {
    /// The window opens one second before `start`; bounds saturate at the i64 range
    fn new(metric: &'a str, start: i64, end: i64) -> Self {
        Self {
            start_absolute: start.saturating_sub(1).saturating_mul(1000),
            end_absolute: end.saturating_mul(1000),
            metrics: [QueryMetric {
                name: metric,
                tags: BTreeMap::new(),
                aggregators: Vec::new(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    queries: Vec<QueryResult>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    results: Vec<SeriesResult>,
}

#[derive(Debug, Deserialize)]
struct SeriesResult {
    #[serde(default)]
    values: Vec<(i64, f64)>,
}

/// Pull the first series out of a query response, converting ms to seconds
fn parse_query_response(response: QueryResponse) -> Result<Vec<DataPoint>, FetchError> {
    if let Some(errors) = response.errors {
        return Err(FetchError::Backend(errors));
    }

    let series = response
        .queries
        .into_iter()
        .next()
        .and_then(|q| q.results.into_iter().next())
        .ok_or_else(|| FetchError::Malformed("response has no query results".to_string()))?;

    Ok(series
        .values
        .into_iter()
        .map(|(ts, value)| DataPoint::new(ts / 1000, value))
        .collect())
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// HTTP client for one KairosDB endpoint
#[derive(Debug, Clone)]
pub struct KairosDbClient {
    client: Client,
    base_url: String,
}

impl KairosDbClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8080`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(16)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl DatapointSource for KairosDbClient {
    fn source_id(&self) -> &str {
        &self.base_url
    }

    async fn query_datapoints(
        &self,
        metric: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<DataPoint>, FetchError> {
        let started = Instant::now();
        let request = QueryRequest::new(metric, start, end);

        let response = self
            .client
            .post(self.endpoint("/api/v1/datapoints/query"))
            .json(&request)
            .send()
            .await?;

        // Query errors come back as JSON with an `errors` key, often with a 400
        let status = response.status();
        let body = response.text().await?;
        let parsed: QueryResponse = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                FetchError::Malformed(e.to_string())
            } else {
                FetchError::Status {
                    status: status.as_u16(),
                    body: truncate_body(body.clone()),
                }
            }
        })?;

        match parse_query_response(parsed) {
            Ok(points) => {
                debug!(
                    metric = %metric,
                    points = points.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Fetched datapoints"
                );
                Ok(points)
            },
            Err(e) => {
                warn!(metric = %metric, start, end, error = %e, "KairosDB query failed");
                Err(e)
            },
        }
    }
}

#[async_trait]
impl DatapointSink for KairosDbClient {
    async fn write_datapoints(&self, batch: &[KairosDatapoint]) -> Result<(), FetchError> {
        if batch.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.endpoint("/api/v1/datapoints"))
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), count = batch.len(), "KairosDB rejected write");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        debug!(count = batch.len(), "Wrote datapoints");
        Ok(())
    }
}
