// crates/types/src/lib.rs
//! Shared data model for the vizperf pipeline.
//!
//! Two raw event streams come in (visualization-session layer and
//! web-access layer), correlated by request id; one flat
//! [`PerformanceRecord`] per correlated bootstrap request comes out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event from the visualization-session log stream.
///
/// The same `request_id` usually appears several times across the
/// stream: different emission points report the same request with
/// partially populated fields, which is why the index reduction in
/// `vizperf-core` exists at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionEvent {
    pub request_id: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

/// One event from the web-access log stream.
///
/// `resource` is optional: access log lines occasionally lack it, and
/// a missing resource is treated as an empty string downstream (it
/// matches nothing, so the event is filtered out, never an error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccessEvent {
    pub request_id: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub request_time_ms: i64,
    pub response_size_bytes: i64,
}

/// One entry per distinct request id, reduced from all
/// [`RawSessionEvent`]s sharing that id.
///
/// `session` and `user` carry the lexicographic maximum of the
/// non-null values observed in the group; `site` carries the minimum.
/// A field that was null in every event of the group stays null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndexEntry {
    pub request_id: String,
    pub session: Option<String>,
    pub user: Option<String>,
    pub site: Option<String>,
}

/// The final persisted entity: one row per correlated bootstrap
/// request. Written once, never mutated. The output store assigns a
/// monotonic integer id on insert; arrival order at the store, not
/// source order, determines id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub session: String,
    pub request_id: String,
    pub time_ms: i64,
    pub response_size: i64,
    /// Normalized username (domain prefix stripped).
    pub user: String,
    pub workbook: String,
    pub dashboard: String,
    pub site: String,
    pub start_timestamp: Option<DateTime<Utc>>,
}

/// Completion signal returned to whatever host runs the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Records durably written to the output store.
    pub persisted: u64,
    /// True when the run completed cleanly but nothing qualified.
    /// A distinct outcome from "something broke".
    pub generated_no_data: bool,
    /// Per-record failure messages accumulated across the run.
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
