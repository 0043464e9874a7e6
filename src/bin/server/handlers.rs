//! HTTP Handlers for the namespace server
//!
//! Find and render follow the Graphite web API shape closely enough for
//! dashboards; the `/api/v1` routes cover ingestion and administration.

use super::types::*;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use kuba_namespace::error::NamespaceError;
use kuba_namespace::fetch::{Finder, FinderEntry, FinderNode};
use kuba_namespace::ingest::{IngestPipeline, MeasurementEvent};
use kuba_namespace::metrics as kns_metrics;
use kuba_namespace::MetricNamespace;
use std::sync::Arc;
use tracing::{debug, error, warn};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state
pub struct AppState {
    /// Namespace index
    pub namespace: Arc<MetricNamespace>,
    /// Find surface bound to the fetch pool
    pub finder: Finder,
    /// Measurement ingestion
    pub pipeline: IngestPipeline,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
    /// Widest accepted `/render` window in seconds
    pub max_render_window_secs: i64,
}

fn error_json(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn namespace_status(e: &NamespaceError) -> StatusCode {
    match e {
        NamespaceError::InvalidName(_) => StatusCode::BAD_REQUEST,
        NamespaceError::LinkTargetMissing(_) => StatusCode::NOT_FOUND,
        NamespaceError::NodeVanished(_) => StatusCode::CONFLICT,
        NamespaceError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// =============================================================================
// Health & Stats Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.namespace.store().store_id().to_string(),
    })
}

/// Namespace and cache statistics
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.namespace.stats())
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, "metrics disabled".to_string());
    }
    match kns_metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e)
        },
    }
}

// =============================================================================
// Find & Render Handlers
// =============================================================================

/// Expand a pattern into branch and leaf nodes
pub async fn find_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FindParams>,
) -> Json<Vec<FinderEntry>> {
    let nodes = state.finder.find_nodes(&params.query).await;
    Json(nodes.iter().map(FinderEntry::from).collect())
}

/// Fill in the default window bounds and reject inverted or oversized windows
pub fn render_window(
    from: Option<i64>,
    until: Option<i64>,
    now: i64,
    max_secs: i64,
) -> Result<(i64, i64), String> {
    let until = until.unwrap_or(now);
    let from = from.unwrap_or_else(|| until.saturating_sub(DEFAULT_RENDER_WINDOW_SECS));
    if from > until {
        return Err(format!("from ({}) is after until ({})", from, until));
    }
    match until.checked_sub(from) {
        Some(width) if width <= max_secs => Ok((from, until)),
        _ => Err(format!(
            "window {}..{} is wider than the {}s limit",
            from, until, max_secs
        )),
    }
}

/// Fetch resampled series for every leaf matching `target`
pub async fn render(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RenderParams>,
) -> impl IntoResponse {
    let window = render_window(
        params.from,
        params.until,
        Utc::now().timestamp(),
        state.max_render_window_secs,
    );
    let (from, until) = match window {
        Ok(window) => window,
        Err(message) => return Err(error_json(StatusCode::BAD_REQUEST, message)),
    };

    // Dispatch every leaf before waiting on any of them
    let pending: Vec<_> = state
        .finder
        .find_nodes(&params.target)
        .await
        .into_iter()
        .filter_map(|node| match node {
            FinderNode::Leaf { path, reader } => Some((path, reader.fetch(from, until))),
            FinderNode::Branch { .. } => None,
        })
        .collect();

    let mut series = Vec::with_capacity(pending.len());
    for (target, fetch) in pending {
        series.push(RenderSeries {
            target,
            window: fetch.wait().await,
        });
    }

    debug!(target = %params.target, series = series.len(), from, until, "Rendered");
    Ok(Json(series))
}

// =============================================================================
// Ingest Handler
// =============================================================================

/// Ingest a batch of measurement events
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(events): Json<Vec<MeasurementEvent>>,
) -> impl IntoResponse {
    match state.pipeline.ingest(&events).await {
        Ok(report) => (
            StatusCode::OK,
            Json(IngestResponse {
                success: true,
                received: report.received,
                accepted: report.accepted,
                rejected: report.rejected,
                error: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, count = events.len(), "Ingest failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(IngestResponse {
                    success: false,
                    received: events.len(),
                    accepted: 0,
                    rejected: 0,
                    error: Some(e.to_string()),
                }),
            )
        },
    }
}

// =============================================================================
// Admin Handlers
// =============================================================================

/// Create a link
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LinkRequest>,
) -> impl IntoResponse {
    match state.namespace.create_link(&req.real, &req.link).await {
        Ok(node) => (
            StatusCode::OK,
            Json(LinkResponse {
                success: true,
                node: Some(node),
                error: None,
            }),
        ),
        Err(e) => {
            warn!(real = %req.real, link = %req.link, error = %e, "Link creation failed");
            (
                namespace_status(&e),
                Json(LinkResponse {
                    success: false,
                    node: None,
                    error: Some(e.to_string()),
                }),
            )
        },
    }
}

/// Delete nodes by name
pub async fn delete_nodes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRequest>,
) -> impl IntoResponse {
    match state.namespace.delete_many(&req.names).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DeleteResponse {
                success: true,
                deleted: req.names.len(),
                error: None,
            }),
        ),
        Err(e) => (
            namespace_status(&e),
            Json(DeleteResponse {
                success: false,
                deleted: 0,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Repair one node's children list
pub async fn repair(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RepairRequest>,
) -> impl IntoResponse {
    match state.namespace.repair_children(&req.name).await {
        Ok(outcome) => (StatusCode::OK, Json(RepairResponse::from(outcome))),
        Err(e) => (
            namespace_status(&e),
            Json(RepairResponse {
                success: false,
                outcome: "error",
                added: Vec::new(),
                removed: Vec::new(),
                error: Some(e.to_string()),
            }),
        ),
    }
}
