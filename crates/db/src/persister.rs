// crates/db/src/persister.rs
//! Concurrent batched writer for performance records.
//!
//! Many producers, one writer: producers hand records to a bounded
//! mpsc channel, and a single flush loop owns the write buffer and
//! the SQLite connection. Producers never coordinate with each other;
//! a full queue applies backpressure at `enqueue`.
//!
//! A failed batch is retried row by row, so exactly the offending
//! rows are reported; one bad record never takes its batch down.

use crate::{Database, DbError, DbResult};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vizperf_types::PerformanceRecord;

#[derive(Debug, Clone, Copy)]
pub struct PersisterConfig {
    /// Records per insert transaction.
    pub batch_size: usize,
    /// Bound of the producer channel; senders await when it is full.
    pub queue_capacity: usize,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            queue_capacity: 1024,
        }
    }
}

/// What the flush loop accomplished by the time the queue drained.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Records durably written.
    pub persisted: u64,
    /// One message per record that could not be written.
    pub failures: Vec<String>,
}

#[derive(Debug, Error)]
#[error("persister is no longer accepting records")]
pub struct EnqueueError;

/// Cloneable producer handle.
#[derive(Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<PerformanceRecord>,
}

impl RecordSender {
    /// Hand one record to the flush loop. Awaits only when the queue
    /// is full.
    pub async fn enqueue(&self, record: PerformanceRecord) -> Result<(), EnqueueError> {
        self.tx.send(record).await.map_err(|_| EnqueueError)
    }
}

/// Owns the channel and the flush task.
///
/// Drop every [`RecordSender`] clone before calling [`shutdown`]:
/// the flush loop only finishes once the last sender is gone.
///
/// [`shutdown`]: RecordPersister::shutdown
pub struct RecordPersister {
    tx: mpsc::Sender<PerformanceRecord>,
    handle: JoinHandle<FlushReport>,
}

impl RecordPersister {
    /// Start the flush loop against `db`. The output schema already
    /// exists; migrations run when the database is opened.
    pub fn spawn(db: &Database, config: PersisterConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let pool = db.pool().clone();
        let batch_size = config.batch_size.max(1);
        let handle = tokio::spawn(flush_loop(pool, batch_size, rx));
        Self { tx, handle }
    }

    pub fn sender(&self) -> RecordSender {
        RecordSender {
            tx: self.tx.clone(),
        }
    }

    /// Drain everything enqueued and stop. Blocks until every record
    /// has either been durably written or definitively failed. Call
    /// exactly once, after all producers have completed.
    pub async fn shutdown(self) -> DbResult<FlushReport> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|e| DbError::PersisterPanic(e.to_string()))
    }
}

async fn flush_loop(
    pool: SqlitePool,
    batch_size: usize,
    mut rx: mpsc::Receiver<PerformanceRecord>,
) -> FlushReport {
    let mut report = FlushReport::default();
    let mut buffer: Vec<PerformanceRecord> = Vec::with_capacity(batch_size);

    while let Some(record) = rx.recv().await {
        buffer.push(record);
        if buffer.len() >= batch_size {
            flush_batch(&pool, &mut buffer, &mut report).await;
        }
    }
    // Channel closed: all senders gone. Drain the tail.
    flush_batch(&pool, &mut buffer, &mut report).await;

    debug!(
        persisted = report.persisted,
        failures = report.failures.len(),
        "persister drained"
    );
    report
}

/// Write the buffer in one transaction; on failure fall back to
/// row-at-a-time so only the offending rows are lost.
async fn flush_batch(
    pool: &SqlitePool,
    buffer: &mut Vec<PerformanceRecord>,
    report: &mut FlushReport,
) {
    if buffer.is_empty() {
        return;
    }

    match insert_all(pool, buffer).await {
        Ok(()) => {
            report.persisted += buffer.len() as u64;
        }
        Err(batch_err) => {
            warn!(error = %batch_err, rows = buffer.len(), "batch insert failed, retrying rows individually");
            for record in buffer.iter() {
                match insert_one(pool, record).await {
                    Ok(()) => report.persisted += 1,
                    Err(e) => {
                        let message =
                            format!("failed to persist record {}: {}", record.request_id, e);
                        warn!("{message}");
                        report.failures.push(message);
                    }
                }
            }
        }
    }
    buffer.clear();
}

async fn insert_all(pool: &SqlitePool, records: &[PerformanceRecord]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for record in records {
        bind_insert(record).execute(&mut *tx).await?;
    }
    tx.commit().await
}

async fn insert_one(pool: &SqlitePool, record: &PerformanceRecord) -> Result<(), sqlx::Error> {
    bind_insert(record).execute(pool).await.map(|_| ())
}

fn bind_insert(
    record: &PerformanceRecord,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        "INSERT INTO performance_records
         (session, request_id, time_ms, response_size, user, workbook, dashboard, site, start_ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(&record.session)
    .bind(&record.request_id)
    .bind(record.time_ms)
    .bind(record.response_size)
    .bind(&record.user)
    .bind(&record.workbook)
    .bind(&record.dashboard)
    .bind(&record.site)
    .bind(record.start_timestamp.map(|t| t.timestamp_millis()))
}
