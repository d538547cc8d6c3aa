// crates/cli/src/main.rs
//! vizperf binary: load the two raw event logs, run the correlation
//! pipeline, and report what was persisted.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vizperf_db::{
    Database, PersisterConfig, Pipeline, PipelineConfig, SqliteEventStore,
};
use vizperf_types::{RawAccessEvent, RawSessionEvent};

#[derive(Debug, Parser)]
#[command(
    name = "vizperf",
    version,
    about = "Correlate web-access and visualization-session logs into performance records"
)]
struct Cli {
    /// Visualization-session event log, one JSON event per line.
    #[arg(long, value_name = "FILE")]
    sessions: PathBuf,

    /// Web-access event log, one JSON event per line.
    #[arg(long, value_name = "FILE")]
    access: PathBuf,

    /// Output database path. Defaults to the user cache directory.
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Records per persister insert transaction.
    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Upper bound on concurrently processed records.
    #[arg(long, default_value_t = 64)]
    max_in_flight: usize,

    /// Enriched documents fetched per cursor read.
    #[arg(long, default_value_t = 256)]
    cursor_batch: usize,
}

/// Read a JSONL file, skipping (and counting) malformed lines.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                skipped += 1;
                warn!(
                    file = %path.display(),
                    line = number + 1,
                    error = %e,
                    "skipping malformed event line"
                );
            }
        }
    }
    if skipped > 0 {
        warn!(file = %path.display(), skipped, "some event lines were skipped");
    }
    Ok(events)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let session_events: Vec<RawSessionEvent> = read_jsonl(&cli.sessions)?;
    let access_events: Vec<RawAccessEvent> = read_jsonl(&cli.access)?;
    info!(
        session_events = session_events.len(),
        access_events = access_events.len(),
        "event logs loaded"
    );

    let db_path = match cli.db {
        Some(path) => path,
        None => vizperf_db::default_db_path()?,
    };
    let db = Database::new(&db_path).await?;

    let store = SqliteEventStore::new(db.clone());
    store.insert_session_events(&session_events).await?;
    store.insert_access_events(&access_events).await?;

    let pipeline = Pipeline::new(
        store,
        db,
        PipelineConfig {
            cursor_batch: cli.cursor_batch,
            max_in_flight: cli.max_in_flight,
            persister: PersisterConfig {
                batch_size: cli.batch_size,
                ..PersisterConfig::default()
            },
        },
    );

    let bar = ProgressBar::new(0).with_style(
        ProgressStyle::with_template("{spinner} {pos}/{len} records {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    let bar_in = bar.clone();
    let report = pipeline
        .execute_with(move |done, total| {
            bar_in.set_length(total);
            bar_in.set_position(done);
        })
        .await
        .context("pipeline run failed")?;
    bar.finish_and_clear();

    for error in &report.errors {
        warn!("{error}");
    }
    if report.generated_no_data {
        eprintln!("No data generated: no request in the access log correlated with a session.");
    } else {
        eprintln!(
            "Persisted {} performance record(s) to {} ({} error(s)).",
            report.persisted,
            db_path.display(),
            report.error_count()
        );
    }
    Ok(())
}
