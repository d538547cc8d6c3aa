// crates/core/src/record.rs
//! Builds one [`PerformanceRecord`] from one materialized enriched
//! document.
//!
//! Documents come back from the store as raw JSON: the materialized
//! collection is written by the engine, and shape problems must stay
//! contained to the single offending record. Every failure path here
//! is a [`BuildError`] the orchestrator catches per record.

use crate::error::BuildError;
use crate::extract::{extract_workbook_dashboard, normalize_user};
use chrono::{DateTime, Utc};
use serde_json::Value;
use vizperf_types::PerformanceRecord;

/// Document keys as written by `EventStore::materialize_enriched`.
const REQUEST_ID: &str = "requestId";
const RESOURCE: &str = "resource";
const TS: &str = "ts";
const REQUEST_TIME_MS: &str = "requestTimeMs";
const RESPONSE_SIZE_BYTES: &str = "responseSizeBytes";
const SESSION: &str = "session";
const USER: &str = "user";
const SITE: &str = "site";

/// Transform one enriched document into a performance record.
///
/// String fields tolerate absence or null (empty string); the two
/// timing/size numbers and the request id are required. `ts` is unix
/// milliseconds or null.
pub fn build_performance_record(doc: &Value) -> Result<PerformanceRecord, BuildError> {
    let resource = lenient_str(doc, RESOURCE)?;
    let (workbook, dashboard) = extract_workbook_dashboard(resource);

    let raw_user = lenient_str(doc, USER)?;

    Ok(PerformanceRecord {
        session: lenient_str(doc, SESSION)?.to_string(),
        request_id: required_str(doc, REQUEST_ID)?.to_string(),
        time_ms: required_i64(doc, REQUEST_TIME_MS)?,
        response_size: required_i64(doc, RESPONSE_SIZE_BYTES)?,
        user: normalize_user(raw_user).to_string(),
        workbook,
        dashboard,
        site: lenient_str(doc, SITE)?.to_string(),
        start_timestamp: optional_ts_millis(doc, TS)?,
    })
}

/// Best-effort identifier for an enriched document, used when a build
/// fails and the error must name the offending record.
pub fn document_id(doc: &Value) -> String {
    match doc.get(REQUEST_ID).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Missing or null string fields read as "".
fn lenient_str<'a>(doc: &'a Value, field: &'static str) -> Result<&'a str, BuildError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(BuildError::BadType { field }),
    }
}

fn required_str<'a>(doc: &'a Value, field: &'static str) -> Result<&'a str, BuildError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(BuildError::MissingField { field }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(BuildError::BadType { field }),
    }
}

fn required_i64(doc: &Value, field: &'static str) -> Result<i64, BuildError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(BuildError::MissingField { field }),
        Some(v) => v.as_i64().ok_or(BuildError::BadType { field }),
    }
}

fn optional_ts_millis(doc: &Value, field: &'static str) -> Result<Option<DateTime<Utc>>, BuildError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let millis = v.as_i64().ok_or(BuildError::BadType { field })?;
            DateTime::<Utc>::from_timestamp_millis(millis)
                .map(Some)
                .ok_or(BuildError::BadType { field })
        }
    }
}
