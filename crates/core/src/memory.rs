// crates/core/src/memory.rs
//! In-memory [`EventStore`] backing the core and pipeline tests.
//!
//! Same observable semantics as the SQLite engine in `vizperf-db`,
//! minus durability: grouped reduce into a hash map, filtered inner
//! join into a vector of documents, batched cursor over a snapshot.

use crate::error::{StoreError, StoreResult};
use crate::session_index::reduce_session_events;
use crate::store::{is_bootstrap_request, EnrichedCursor, EventStore, SourceCounts};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use vizperf_types::{RawAccessEvent, RawSessionEvent, SessionIndexEntry};

pub struct InMemoryStore {
    session_events: Vec<RawSessionEvent>,
    access_events: Vec<RawAccessEvent>,
    index: RwLock<HashMap<String, SessionIndexEntry>>,
    enriched: RwLock<Vec<Value>>,
    staged: RwLock<Vec<Value>>,
    reachable: bool,
}

impl InMemoryStore {
    pub fn new(
        session_events: Vec<RawSessionEvent>,
        access_events: Vec<RawAccessEvent>,
    ) -> Self {
        Self {
            session_events,
            access_events,
            index: RwLock::new(HashMap::new()),
            enriched: RwLock::new(Vec::new()),
            staged: RwLock::new(Vec::new()),
            reachable: true,
        }
    }

    /// A store whose source collections cannot be counted. Exercises
    /// the fatal setup path without a real backend outage.
    pub fn unreachable() -> Self {
        let mut store = Self::new(Vec::new(), Vec::new());
        store.reachable = false;
        store
    }

    /// Stage a raw document for the enriched collection, bypassing
    /// the join. Staged documents are appended after the join results
    /// on every materialization; they let callers inject malformed
    /// documents the join itself would never produce.
    pub async fn push_enriched_document(&self, doc: Value) {
        self.staged.write().await.push(doc);
    }

    /// Current index entry for a request id, if the index is built.
    pub async fn index_entry(&self, request_id: &str) -> Option<SessionIndexEntry> {
        self.index.read().await.get(request_id).cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn source_counts(&self) -> StoreResult<SourceCounts> {
        if !self.reachable {
            return Err(StoreError::source_unreachable("session_events"));
        }
        Ok(SourceCounts {
            session_events: self.session_events.len() as u64,
            access_events: self.access_events.len() as u64,
        })
    }

    async fn build_session_index(&self) -> StoreResult<u64> {
        let mut groups: HashMap<&str, Vec<RawSessionEvent>> = HashMap::new();
        for event in &self.session_events {
            groups
                .entry(event.request_id.as_str())
                .or_default()
                .push(event.clone());
        }

        let mut index = self.index.write().await;
        index.clear();
        for (request_id, events) in groups {
            index.insert(
                request_id.to_string(),
                reduce_session_events(request_id, &events),
            );
        }
        debug!(entries = index.len(), "in-memory session index built");
        Ok(index.len() as u64)
    }

    async fn materialize_enriched(&self) -> StoreResult<u64> {
        let index = self.index.read().await;
        let mut enriched = self.enriched.write().await;
        enriched.clear();

        for event in &self.access_events {
            // Missing resource reads as empty: filtered, not an error.
            let resource = event.resource.as_deref().unwrap_or("");
            if !is_bootstrap_request(resource) {
                continue;
            }
            // Inner join: no index entry, no document.
            let Some(entry) = index.get(event.request_id.as_str()) else {
                continue;
            };
            enriched.push(json!({
                "requestId": event.request_id,
                "resource": event.resource,
                "ts": event.timestamp.map(|t| t.timestamp_millis()),
                "requestTimeMs": event.request_time_ms,
                "responseSizeBytes": event.response_size_bytes,
                "session": entry.session,
                "user": entry.user,
                "site": entry.site,
            }));
        }
        enriched.extend(self.staged.read().await.iter().cloned());
        debug!(documents = enriched.len(), "in-memory enriched collection materialized");
        Ok(enriched.len() as u64)
    }

    async fn enriched_cursor(&self, batch_size: usize) -> StoreResult<Box<dyn EnrichedCursor>> {
        let docs = self.enriched.read().await.clone();
        Ok(Box::new(MemoryCursor {
            docs,
            pos: 0,
            batch_size: batch_size.max(1),
        }))
    }
}

struct MemoryCursor {
    docs: Vec<Value>,
    pos: usize,
    batch_size: usize,
}

#[async_trait]
impl EnrichedCursor for MemoryCursor {
    async fn next_batch(&mut self) -> StoreResult<Vec<Value>> {
        let end = (self.pos + self.batch_size).min(self.docs.len());
        let batch = self.docs[self.pos..end].to_vec();
        self.pos = end;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn session_event(request_id: &str, session: &str, user: &str, site: &str) -> RawSessionEvent {
        RawSessionEvent {
            request_id: request_id.to_string(),
            session: Some(session.to_string()),
            user: Some(user.to_string()),
            site: Some(site.to_string()),
        }
    }

    fn access_event(request_id: &str, resource: Option<&str>) -> RawAccessEvent {
        RawAccessEvent {
            request_id: request_id.to_string(),
            resource: resource.map(Into::into),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            request_time_ms: 120,
            response_size_bytes: 4096,
        }
    }

    #[tokio::test]
    async fn test_index_groups_by_request_id() {
        let store = InMemoryStore::new(
            vec![
                session_event("r1", "a", "u1", "siteB"),
                session_event("r1", "b", "u0", "siteA"),
                session_event("r2", "z", "u9", "siteC"),
            ],
            vec![],
        );
        assert_eq!(store.build_session_index().await.unwrap(), 2);

        let entry = store.index_entry("r1").await.unwrap();
        assert_eq!(entry.session.as_deref(), Some("b"));
        assert_eq!(entry.user.as_deref(), Some("u1"));
        assert_eq!(entry.site.as_deref(), Some("siteA"));
    }

    #[tokio::test]
    async fn test_filter_excludes_non_bootstrap_before_join() {
        let store = InMemoryStore::new(
            vec![session_event("r1", "s1", "u1", "siteA")],
            vec![
                access_event("r1", Some("/views/w/Sales/v/Overview")),
                access_event("r1", Some("/w/Sales/v/Overview/bootstrapSession")),
            ],
        );
        store.build_session_index().await.unwrap();
        assert_eq!(store.materialize_enriched().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_join_miss_drops_event() {
        let store = InMemoryStore::new(
            vec![session_event("r1", "s1", "u1", "siteA")],
            vec![access_event("r9", Some("/w/S/v/O/bootstrapSession"))],
        );
        store.build_session_index().await.unwrap();
        assert_eq!(store.materialize_enriched().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_resource_is_filtered_not_errored() {
        let store = InMemoryStore::new(
            vec![session_event("r1", "s1", "u1", "siteA")],
            vec![access_event("r1", None)],
        );
        store.build_session_index().await.unwrap();
        assert_eq!(store.materialize_enriched().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enriched_document_shape() {
        let store = InMemoryStore::new(
            vec![session_event("r1", "s1", "DOM\\bob", "siteA")],
            vec![access_event(
                "r1",
                Some("/t/siteA/views/w/Sales/v/Overview/bootstrapSession"),
            )],
        );
        store.build_session_index().await.unwrap();
        store.materialize_enriched().await.unwrap();

        let mut cursor = store.enriched_cursor(10).await.unwrap();
        let batch = cursor.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        let doc = &batch[0];
        assert_eq!(doc["requestId"], "r1");
        assert_eq!(doc["session"], "s1");
        assert_eq!(doc["user"], "DOM\\bob");
        assert_eq!(doc["requestTimeMs"], 120);
        assert!(doc["ts"].is_i64());
    }

    #[tokio::test]
    async fn test_cursor_batches_and_terminates() {
        let store = InMemoryStore::new(vec![], vec![]);
        for i in 0..5 {
            store
                .push_enriched_document(json!({"requestId": format!("r{i}")}))
                .await;
        }
        assert_eq!(store.materialize_enriched().await.unwrap(), 5);

        let mut cursor = store.enriched_cursor(2).await.unwrap();
        let mut sizes = Vec::new();
        loop {
            let batch = cursor.next_batch().await.unwrap();
            if batch.is_empty() {
                break;
            }
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_unreachable_source_errors() {
        let store = InMemoryStore::unreachable();
        assert!(matches!(
            store.source_counts().await,
            Err(StoreError::SourceUnreachable { .. })
        ));
    }
}
