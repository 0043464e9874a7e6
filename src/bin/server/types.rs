//! Request and Response Types for the namespace HTTP server

use kuba_namespace::fetch::SeriesWindow;
use kuba_namespace::namespace::RepairOutcome;
use kuba_namespace::MetricNode;
use serde::{Deserialize, Serialize};

/// Default render window when `from` is omitted
pub const DEFAULT_RENDER_WINDOW_SECS: i64 = 86_400;

// =============================================================================
// Health
// =============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: String,
}

// =============================================================================
// Find / Render
// =============================================================================

/// `GET /metrics/find` parameters
#[derive(Debug, Deserialize)]
pub struct FindParams {
    /// Dotted pattern, globs allowed per segment
    pub query: String,
}

/// `GET /render` parameters
///
/// `target` may be a pattern; every matching leaf is rendered.
#[derive(Debug, Deserialize)]
pub struct RenderParams {
    pub target: String,
    /// Window start in epoch seconds (default: `until` minus one day)
    #[serde(default)]
    pub from: Option<i64>,
    /// Window end in epoch seconds (default: now)
    #[serde(default)]
    pub until: Option<i64>,
}

/// One rendered series
#[derive(Debug, Serialize)]
pub struct RenderSeries {
    pub target: String,
    #[serde(flatten)]
    pub window: SeriesWindow,
}

// =============================================================================
// Ingest
// =============================================================================

/// Ingest response
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Admin
// =============================================================================

/// Link creation request
#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    /// Existing node the link points at
    pub real: String,
    /// Name of the link node
    pub link: String,
}

/// Link creation response
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<MetricNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bulk delete request
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub names: Vec<String>,
}

/// Bulk delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Repair request
#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub name: String,
}

/// Repair response
#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub success: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RepairOutcome> for RepairResponse {
    fn from(outcome: RepairOutcome) -> Self {
        let label = outcome.label();
        let (added, removed) = match outcome {
            RepairOutcome::Repaired { added, removed } => (added, removed),
            _ => (Vec::new(), Vec::new()),
        };
        Self {
            success: true,
            outcome: label,
            added,
            removed,
            error: None,
        }
    }
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
