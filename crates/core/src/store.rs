// crates/core/src/store.rs
//! The narrow seam between pipeline logic and whatever engine holds
//! the event collections.
//!
//! Three bulk operations (grouped reduce, filtered join, cursor read)
//! cover everything the orchestrator needs, so the core stays
//! testable against [`crate::memory::InMemoryStore`] while production
//! runs on the SQLite-backed implementation in `vizperf-db`. The
//! engine owns its execution plan; the trait only fixes semantics.

use crate::error::StoreResult;
use async_trait::async_trait;
use memchr::memmem;

/// Literal marker identifying a bootstrap session request anywhere in
/// a resource path.
pub const BOOTSTRAP_MARKER: &str = "bootstrapSession";

/// True when the resource path identifies a bootstrap session
/// request. Substring match, any position.
pub fn is_bootstrap_request(resource: &str) -> bool {
    memmem::find(resource.as_bytes(), BOOTSTRAP_MARKER.as_bytes()).is_some()
}

/// Row counts of the two source collections, checked once before the
/// pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCounts {
    pub session_events: u64,
    pub access_events: u64,
}

/// Resumable batched read over the materialized enriched collection.
///
/// Yields raw documents rather than typed records: downstream record
/// building is fallible per document, and the shape check belongs
/// there, not in the cursor.
#[async_trait]
pub trait EnrichedCursor: Send {
    /// Next batch of documents. An empty batch means the cursor is
    /// exhausted.
    async fn next_batch(&mut self) -> StoreResult<Vec<serde_json::Value>>;
}

/// Storage engine holding the raw event collections and the two
/// materialized intermediates (session index, enriched requests).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Count both source collections. Failure here means a source is
    /// unreachable, which aborts the run before any processing.
    async fn source_counts(&self) -> StoreResult<SourceCounts>;

    /// Group the session event stream by request id, reduce each
    /// group per [`crate::session_index::reduce_session_events`]
    /// semantics, and materialize one entry per distinct id. The
    /// index is only queryable once this returns; no partial
    /// emission. Returns the number of index entries.
    async fn build_session_index(&self) -> StoreResult<u64>;

    /// Filter access events to bootstrap requests, inner-join them
    /// against the session index by request id, and materialize one
    /// enriched document per match. Unmatched or filtered events are
    /// dropped silently. Returns the number of enriched documents.
    async fn materialize_enriched(&self) -> StoreResult<u64>;

    /// Open a cursor over the materialized enriched collection.
    async fn enriched_cursor(&self, batch_size: usize) -> StoreResult<Box<dyn EnrichedCursor>>;
}
