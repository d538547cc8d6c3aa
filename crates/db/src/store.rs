// crates/db/src/store.rs
//! SQLite-backed [`EventStore`]: the durable engine behind the
//! pipeline's grouped-reduce, filtered-join, and cursor operations.
//!
//! Each stage is one fused SQL statement, so the engine owns the
//! execution plan and intermediate results never pass through this
//! process. Enriched documents are materialized as JSON text and read
//! back through a rowid-keyed resumable cursor.

use crate::{Database, DbResult};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;
use vizperf_core::{
    EnrichedCursor, EventStore, SourceCounts, StoreError, StoreResult, BOOTSTRAP_MARKER,
};
use vizperf_types::{RawAccessEvent, RawSessionEvent};

/// Batch size for source ingestion transactions.
const INGEST_CHUNK: usize = 500;

#[derive(Clone)]
pub struct SqliteEventStore {
    db: Database,
}

impl SqliteEventStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load raw session events into the source collection.
    pub async fn insert_session_events(&self, events: &[RawSessionEvent]) -> DbResult<u64> {
        let mut written = 0u64;
        for chunk in events.chunks(INGEST_CHUNK) {
            let mut tx = self.db.pool().begin().await?;
            for event in chunk {
                sqlx::query(
                    "INSERT INTO session_events (request_id, session, user, site)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(&event.request_id)
                .bind(&event.session)
                .bind(&event.user)
                .bind(&event.site)
                .execute(&mut *tx)
                .await?;
                written += 1;
            }
            tx.commit().await?;
        }
        Ok(written)
    }

    /// Load raw access events into the source collection.
    pub async fn insert_access_events(&self, events: &[RawAccessEvent]) -> DbResult<u64> {
        let mut written = 0u64;
        for chunk in events.chunks(INGEST_CHUNK) {
            let mut tx = self.db.pool().begin().await?;
            for event in chunk {
                sqlx::query(
                    "INSERT INTO access_events (request_id, resource, ts, request_time, response_size)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(&event.request_id)
                .bind(&event.resource)
                .bind(event.timestamp.map(|t| t.timestamp_millis()))
                .bind(event.request_time_ms)
                .bind(event.response_size_bytes)
                .execute(&mut *tx)
                .await?;
                written += 1;
            }
            tx.commit().await?;
        }
        Ok(written)
    }
}

fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::backend(e.to_string())
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn source_counts(&self) -> StoreResult<SourceCounts> {
        let sessions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_events")
            .fetch_one(self.db.pool())
            .await
            .map_err(|_| StoreError::source_unreachable("session_events"))?;
        let accesses: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM access_events")
            .fetch_one(self.db.pool())
            .await
            .map_err(|_| StoreError::source_unreachable("access_events"))?;
        Ok(SourceCounts {
            session_events: sessions.0 as u64,
            access_events: accesses.0 as u64,
        })
    }

    async fn build_session_index(&self) -> StoreResult<u64> {
        // MAX/MIN over TEXT under BINARY collation is byte-wise string
        // ordering, the same ordering reduce_session_events uses.
        // MAX/MIN ignore NULLs; an all-null group reduces to NULL.
        sqlx::query("DELETE FROM session_index")
            .execute(self.db.pool())
            .await
            .map_err(backend_err)?;

        let result = sqlx::query(
            "INSERT INTO session_index (request_id, session, user, site)
             SELECT request_id, MAX(session), MAX(user), MIN(site)
             FROM session_events
             GROUP BY request_id",
        )
        .execute(self.db.pool())
        .await
        .map_err(backend_err)?;

        debug!(entries = result.rows_affected(), "session index materialized");
        Ok(result.rows_affected())
    }

    async fn materialize_enriched(&self) -> StoreResult<u64> {
        sqlx::query("DELETE FROM enriched_requests")
            .execute(self.db.pool())
            .await
            .map_err(backend_err)?;

        // Filter before join; missing resource coalesces to '' and is
        // filtered. Inner join drops access events without an index
        // entry.
        let result = sqlx::query(
            "INSERT INTO enriched_requests (doc)
             SELECT json_object(
                 'requestId', a.request_id,
                 'resource', a.resource,
                 'ts', a.ts,
                 'requestTimeMs', a.request_time,
                 'responseSizeBytes', a.response_size,
                 'session', s.session,
                 'user', s.user,
                 'site', s.site
             )
             FROM access_events a
             JOIN session_index s ON s.request_id = a.request_id
             WHERE instr(COALESCE(a.resource, ''), ?1) > 0",
        )
        .bind(BOOTSTRAP_MARKER)
        .execute(self.db.pool())
        .await
        .map_err(backend_err)?;

        debug!(documents = result.rows_affected(), "enriched requests materialized");
        Ok(result.rows_affected())
    }

    async fn enriched_cursor(&self, batch_size: usize) -> StoreResult<Box<dyn EnrichedCursor>> {
        Ok(Box::new(SqliteCursor {
            pool: self.db.pool().clone(),
            last_id: 0,
            batch_size: batch_size.max(1) as i64,
        }))
    }
}

/// Rowid-keyed pagination: resumable and stable regardless of batch
/// size, since the materialized collection is immutable while read.
struct SqliteCursor {
    pool: SqlitePool,
    last_id: i64,
    batch_size: i64,
}

#[async_trait]
impl EnrichedCursor for SqliteCursor {
    async fn next_batch(&mut self) -> StoreResult<Vec<Value>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, doc FROM enriched_requests WHERE id > ?1 ORDER BY id LIMIT ?2",
        )
        .bind(self.last_id)
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        let mut batch = Vec::with_capacity(rows.len());
        for (id, doc) in rows {
            self.last_id = id;
            batch.push(serde_json::from_str(&doc)?);
        }
        Ok(batch)
    }
}
