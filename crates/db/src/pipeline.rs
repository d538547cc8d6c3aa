// crates/db/src/pipeline.rs
//! Pipeline orchestrator: build the session index, enrich, then
//! extract and persist. Strictly sequential stages, no loop-back.
//!
//! The first two stages run as single bulk operations inside the
//! event store. The third is the concurrency surface: one
//! build-then-enqueue task per enriched document, bounded by a
//! semaphore, with a single wait-all barrier before the persister is
//! shut down. Per-record failures are collected, never fatal; only a
//! setup failure (source collections unreachable) aborts the run.

use crate::persister::{PersisterConfig, RecordPersister};
use crate::{Database, DbError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use vizperf_core::record::{build_performance_record, document_id};
use vizperf_core::{EventStore, StoreError};
use vizperf_types::RunReport;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Documents fetched per cursor read.
    pub cursor_batch: usize,
    /// Upper bound on simultaneously in-flight record tasks.
    pub max_in_flight: usize,
    pub persister: PersisterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cursor_batch: 256,
            max_in_flight: 64,
            persister: PersisterConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source collections unreachable; the run aborts before the
    /// index build begins.
    #[error("Pipeline setup failed: {0}")]
    Setup(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub struct Pipeline<S: EventStore> {
    store: S,
    db: Database,
    config: PipelineConfig,
}

impl<S: EventStore> Pipeline<S> {
    pub fn new(store: S, db: Database, config: PipelineConfig) -> Self {
        Self { store, db, config }
    }

    /// Run the whole pipeline and return the completion signal.
    pub async fn execute(&self) -> Result<RunReport, PipelineError> {
        self.execute_with(|_, _| {}).await
    }

    /// Run the pipeline, invoking `on_progress(done, total)` once per
    /// processed enriched document during the persist stage.
    pub async fn execute_with<F>(&self, on_progress: F) -> Result<RunReport, PipelineError>
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        // Setup check: both source collections must be reachable.
        let counts = self
            .store
            .source_counts()
            .await
            .map_err(PipelineError::Setup)?;
        info!(
            session_events = counts.session_events,
            access_events = counts.access_events,
            "sources reachable, starting pipeline"
        );

        let index_entries = self.store.build_session_index().await?;
        info!(entries = index_entries, "session index built");

        let enriched_total = self.store.materialize_enriched().await?;
        info!(documents = enriched_total, "enriched requests materialized");

        let (persisted, errors) = self
            .extract_and_persist(enriched_total, on_progress)
            .await?;

        let report = RunReport {
            persisted,
            generated_no_data: persisted == 0,
            errors,
        };
        if report.generated_no_data {
            info!("no data generated");
        } else {
            info!(
                persisted = report.persisted,
                errors = report.error_count(),
                "pipeline complete"
            );
        }
        Ok(report)
    }

    /// One task per enriched document, bounded by `max_in_flight`,
    /// joined at a single barrier before persister shutdown. No
    /// ordering is preserved across tasks.
    async fn extract_and_persist<F>(
        &self,
        total: u64,
        on_progress: F,
    ) -> Result<(u64, Vec<String>), PipelineError>
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        let persister = RecordPersister::spawn(&self.db, self.config.persister);
        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let processed = Arc::new(AtomicU64::new(0));
        let on_progress = Arc::new(on_progress);
        let mut tasks = JoinSet::new();

        let mut cursor = self.store.enriched_cursor(self.config.cursor_batch).await?;
        'read: loop {
            let batch = cursor.next_batch().await?;
            if batch.is_empty() {
                break;
            }
            for doc in batch {
                // The limiter is never closed; if it somehow is, stop
                // reading and let the barrier below drain what ran.
                let Ok(permit) = limiter.clone().acquire_owned().await else {
                    break 'read;
                };
                let sender = persister.sender();
                let task_errors = errors.clone();
                let processed = processed.clone();
                let on_progress = on_progress.clone();

                tasks.spawn(async move {
                    let _permit = permit;
                    match build_performance_record(&doc) {
                        Ok(record) => {
                            if sender.enqueue(record).await.is_err() {
                                let message = format!(
                                    "failed to queue record {}: persister gone",
                                    document_id(&doc)
                                );
                                warn!("{message}");
                                task_errors.lock().await.push(message);
                            }
                        }
                        Err(e) => {
                            let message =
                                format!("failed to build record {}: {}", document_id(&doc), e);
                            warn!("{message}");
                            task_errors.lock().await.push(message);
                        }
                    }
                    let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(done, total);
                });

                // Reap finished handles as we go: the set stays
                // bounded by the limiter, not by the document count.
                while let Some(joined) = tasks.try_join_next() {
                    note_join_failure(joined, &errors).await;
                }
            }
        }

        // Wait-all barrier: every spawned task finishes before the
        // persister is told to drain.
        while let Some(joined) = tasks.join_next().await {
            note_join_failure(joined, &errors).await;
        }

        let flush = persister.shutdown().await?;
        let mut errors = std::mem::take(&mut *errors.lock().await);
        errors.extend(flush.failures);
        Ok((flush.persisted, errors))
    }
}

async fn note_join_failure(
    joined: Result<(), tokio::task::JoinError>,
    errors: &Mutex<Vec<String>>,
) {
    if let Err(e) = joined {
        let message = format!("record task failed: {e}");
        warn!("{message}");
        errors.lock().await.push(message);
    }
}
