// crates/db/src/queries.rs
// Read-side helpers over the performance_records output table.

use crate::{Database, DbResult};
use chrono::{DateTime, Utc};
use sqlx::Row;

/// One persisted performance record, id included.
#[derive(Debug, Clone)]
pub struct PerformanceRow {
    pub id: i64,
    pub session: String,
    pub request_id: String,
    pub time_ms: i64,
    pub response_size: i64,
    pub user: String,
    pub workbook: String,
    pub dashboard: String,
    pub site: String,
    pub start_ts: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for PerformanceRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session: row.try_get("session")?,
            request_id: row.try_get("request_id")?,
            time_ms: row.try_get("time_ms")?,
            response_size: row.try_get("response_size")?,
            user: row.try_get("user")?,
            workbook: row.try_get("workbook")?,
            dashboard: row.try_get("dashboard")?,
            site: row.try_get("site")?,
            start_ts: row.try_get("start_ts")?,
        })
    }
}

impl PerformanceRow {
    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.start_ts.and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

pub async fn count_performance_records(db: &Database) -> DbResult<u64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM performance_records")
        .fetch_one(db.pool())
        .await?;
    Ok(row.0 as u64)
}

/// All persisted records in id (write-arrival) order.
pub async fn list_performance_records(db: &Database) -> DbResult<Vec<PerformanceRow>> {
    let rows = sqlx::query_as::<_, PerformanceRow>(
        "SELECT id, session, request_id, time_ms, response_size,
                user, workbook, dashboard, site, start_ts
         FROM performance_records
         ORDER BY id",
    )
    .fetch_all(db.pool())
    .await?;
    Ok(rows)
}
