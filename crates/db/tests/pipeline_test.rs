// crates/db/tests/pipeline_test.rs
//! Full-pipeline tests against the SQLite event store: raw events in,
//! performance records out.

use chrono::{TimeZone, Utc};
use vizperf_db::{queries, Database, Pipeline, PipelineConfig, SqliteEventStore};
use vizperf_types::{RawAccessEvent, RawSessionEvent};

fn session_event(
    request_id: &str,
    session: Option<&str>,
    user: Option<&str>,
    site: Option<&str>,
) -> RawSessionEvent {
    RawSessionEvent {
        request_id: request_id.to_string(),
        session: session.map(Into::into),
        user: user.map(Into::into),
        site: site.map(Into::into),
    }
}

fn access_event(request_id: &str, resource: &str) -> RawAccessEvent {
    RawAccessEvent {
        request_id: request_id.to_string(),
        resource: Some(resource.to_string()),
        timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        request_time_ms: 120,
        response_size_bytes: 4096,
    }
}

#[tokio::test]
async fn test_full_run_produces_expected_record() {
    let db = Database::new_in_memory().await.unwrap();
    let store = SqliteEventStore::new(db.clone());

    store
        .insert_session_events(&[session_event(
            "r1",
            Some("s1"),
            Some("DOM\\bob"),
            Some("siteA"),
        )])
        .await
        .unwrap();
    store
        .insert_access_events(&[access_event(
            "r1",
            "/t/siteA/views/w/Sales/v/Overview/bootstrapSession",
        )])
        .await
        .unwrap();

    let pipeline = Pipeline::new(store, db.clone(), PipelineConfig::default());
    let report = pipeline.execute().await.unwrap();

    assert_eq!(report.persisted, 1);
    assert!(!report.generated_no_data);
    assert!(report.errors.is_empty());

    let rows = queries::list_performance_records(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.session, "s1");
    assert_eq!(row.user, "bob");
    assert_eq!(row.workbook, "Sales");
    assert_eq!(row.dashboard, "Overview");
    assert_eq!(row.site, "siteA");
    assert_eq!(row.request_id, "r1");
    assert_eq!(row.time_ms, 120);
    assert_eq!(row.response_size, 4096);
    assert_eq!(
        row.start_timestamp().unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_empty_collections_signal_no_data() {
    let db = Database::new_in_memory().await.unwrap();
    let store = SqliteEventStore::new(db.clone());

    let pipeline = Pipeline::new(store, db, PipelineConfig::default());
    let report = pipeline.execute().await.unwrap();

    assert_eq!(report.persisted, 0);
    assert!(report.generated_no_data);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_duplicate_session_events_reduce_before_join() {
    let db = Database::new_in_memory().await.unwrap();
    let store = SqliteEventStore::new(db.clone());

    // Three partial reports of the same request from different
    // emission points.
    store
        .insert_session_events(&[
            session_event("r1", Some("sessA"), None, Some("siteB")),
            session_event("r1", Some("sessB"), Some("DOM\\ann"), Some("siteA")),
            session_event("r1", None, Some("DOM\\abe"), None),
        ])
        .await
        .unwrap();
    store
        .insert_access_events(&[access_event(
            "r1",
            "/w/Finance/v/Spend/bootstrapSession",
        )])
        .await
        .unwrap();

    let pipeline = Pipeline::new(store, db.clone(), PipelineConfig::default());
    let report = pipeline.execute().await.unwrap();
    assert_eq!(report.persisted, 1);

    let rows = queries::list_performance_records(&db).await.unwrap();
    assert_eq!(rows[0].session, "sessB"); // max
    assert_eq!(rows[0].user, "ann"); // max of raw, then normalized
    assert_eq!(rows[0].site, "siteA"); // min
}

#[tokio::test]
async fn test_unjoined_and_unmatched_events_drop_silently() {
    let db = Database::new_in_memory().await.unwrap();
    let store = SqliteEventStore::new(db.clone());

    store
        .insert_session_events(&[session_event("r1", Some("s1"), Some("u"), Some("site"))])
        .await
        .unwrap();
    store
        .insert_access_events(&[
            // no bootstrap marker: filtered before the join
            access_event("r1", "/views/w/Sales/v/Overview"),
            // marker but no session index entry: join miss
            access_event("r404", "/w/Sales/v/Overview/bootstrapSession"),
            // survives
            access_event("r1", "/w/Sales/v/Overview/bootstrapSession"),
        ])
        .await
        .unwrap();

    let pipeline = Pipeline::new(store, db.clone(), PipelineConfig::default());
    let report = pipeline.execute().await.unwrap();

    assert_eq!(report.persisted, 1);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_unmatched_resource_persists_with_empty_extraction() {
    let db = Database::new_in_memory().await.unwrap();
    let store = SqliteEventStore::new(db.clone());

    store
        .insert_session_events(&[session_event("r1", Some("s1"), Some("u"), Some("site"))])
        .await
        .unwrap();
    store
        .insert_access_events(&[access_event("r1", "/vizql/bootstrapSession/sessions/77")])
        .await
        .unwrap();

    let pipeline = Pipeline::new(store, db.clone(), PipelineConfig::default());
    let report = pipeline.execute().await.unwrap();
    assert_eq!(report.persisted, 1);

    let rows = queries::list_performance_records(&db).await.unwrap();
    assert_eq!(rows[0].workbook, "");
    assert_eq!(rows[0].dashboard, "");
}

#[tokio::test]
async fn test_large_run_with_small_batches() {
    let db = Database::new_in_memory().await.unwrap();
    let store = SqliteEventStore::new(db.clone());

    let sessions: Vec<RawSessionEvent> = (0..200)
        .map(|i| session_event(&format!("r{i}"), Some("s"), Some("u"), Some("site")))
        .collect();
    let accesses: Vec<RawAccessEvent> = (0..200)
        .map(|i| access_event(&format!("r{i}"), "/w/W/v/D/bootstrapSession"))
        .collect();
    store.insert_session_events(&sessions).await.unwrap();
    store.insert_access_events(&accesses).await.unwrap();

    let pipeline = Pipeline::new(
        store,
        db.clone(),
        PipelineConfig {
            cursor_batch: 16,
            max_in_flight: 8,
            persister: vizperf_db::PersisterConfig {
                batch_size: 32,
                queue_capacity: 64,
            },
        },
    );
    let report = pipeline.execute().await.unwrap();

    assert_eq!(report.persisted, 200);
    assert!(report.errors.is_empty());
    assert_eq!(queries::count_performance_records(&db).await.unwrap(), 200);

    let rows = queries::list_performance_records(&db).await.unwrap();
    let mut ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 200, "ids are unique and monotonic");
}
