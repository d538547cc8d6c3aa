/// Inline SQL migrations for the vizperf database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: raw source collections
    r#"
CREATE TABLE IF NOT EXISTS session_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    session TEXT,
    user TEXT,
    site TEXT
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS access_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    resource TEXT,
    ts INTEGER,
    request_time INTEGER NOT NULL,
    response_size INTEGER NOT NULL
);
"#,
    // Migration 2: source-side lookup indexes for the grouped reduce
    // and the correlation join
    r#"CREATE INDEX IF NOT EXISTS idx_session_events_request ON session_events(request_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_access_events_request ON access_events(request_id);"#,
    // Migration 3: materialized session index, one row per request id
    r#"
CREATE TABLE IF NOT EXISTS session_index (
    request_id TEXT PRIMARY KEY,
    session TEXT,
    user TEXT,
    site TEXT
);
"#,
    // Migration 4: materialized enriched requests, read back via a
    // rowid-keyed cursor
    r#"
CREATE TABLE IF NOT EXISTS enriched_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc TEXT NOT NULL
);
"#,
    // Migration 5: output table
    r#"
CREATE TABLE IF NOT EXISTS performance_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session TEXT NOT NULL DEFAULT '',
    request_id TEXT NOT NULL,
    time_ms INTEGER NOT NULL,
    response_size INTEGER NOT NULL,
    user TEXT NOT NULL DEFAULT '',
    workbook TEXT NOT NULL DEFAULT '',
    dashboard TEXT NOT NULL DEFAULT '',
    site TEXT NOT NULL DEFAULT '',
    start_ts INTEGER
);
"#,
    // Migration 6: secondary lookup indexes for downstream queries
    r#"CREATE INDEX IF NOT EXISTS idx_performance_session ON performance_records(session);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_performance_dashboard ON performance_records(dashboard);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_performance_user ON performance_records(user);"#,
];
