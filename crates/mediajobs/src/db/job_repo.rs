//! Row-level operations on the `jobs` table.
//!
//! Functions take a `&Connection` so callers can compose several of them
//! under one lock (see `Database::with_conn`).

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub target_kind: String,
    pub target_id: String,
    pub field_name: String,
    pub kind: String,
    pub status: String,
    pub task_id: Option<String>,
    pub attempt: i64,
    pub max_attempts: i64,
    pub progress: i64,
    pub message: Option<String>,
    pub error: Option<String>,
    pub heartbeat_at: Option<String>,
    pub stage: Option<String>,
    pub stage_index: Option<i64>,
    pub stage_count: Option<i64>,
    pub stage_weight: Option<i64>,
    pub stage_progress: Option<f64>,
    pub stage_started_at: Option<String>,
    pub stage_plan: Option<String>,
    pub stage_total_weight: Option<i64>,
    pub stage_completed_weight: Option<i64>,
    pub source_path: Option<String>,
    pub output_path: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            target_kind: row.get("target_kind")?,
            target_id: row.get("target_id")?,
            field_name: row.get("field_name")?,
            kind: row.get("kind")?,
            status: row.get("status")?,
            task_id: row.get("task_id")?,
            attempt: row.get("attempt")?,
            max_attempts: row.get("max_attempts")?,
            progress: row.get("progress")?,
            message: row.get("message")?,
            error: row.get("error")?,
            heartbeat_at: row.get("heartbeat_at")?,
            stage: row.get("stage")?,
            stage_index: row.get("stage_index")?,
            stage_count: row.get("stage_count")?,
            stage_weight: row.get("stage_weight")?,
            stage_progress: row.get("stage_progress")?,
            stage_started_at: row.get("stage_started_at")?,
            stage_plan: row.get("stage_plan")?,
            stage_total_weight: row.get("stage_total_weight")?,
            stage_completed_weight: row.get("stage_completed_weight")?,
            source_path: row.get("source_path")?,
            output_path: row.get("output_path")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            duration_ms: row.get("duration_ms")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// All mutable columns with their values, in table order.
    /// `id`, the target key and `created_at` are never rewritten.
    fn mutable_columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("kind", text(&self.kind)),
            ("status", text(&self.status)),
            ("task_id", opt_text(&self.task_id)),
            ("attempt", Value::Integer(self.attempt)),
            ("max_attempts", Value::Integer(self.max_attempts)),
            ("progress", Value::Integer(self.progress)),
            ("message", opt_text(&self.message)),
            ("error", opt_text(&self.error)),
            ("heartbeat_at", opt_text(&self.heartbeat_at)),
            ("stage", opt_text(&self.stage)),
            ("stage_index", opt_int(self.stage_index)),
            ("stage_count", opt_int(self.stage_count)),
            ("stage_weight", opt_int(self.stage_weight)),
            (
                "stage_progress",
                self.stage_progress.map_or(Value::Null, Value::Real),
            ),
            ("stage_started_at", opt_text(&self.stage_started_at)),
            ("stage_plan", opt_text(&self.stage_plan)),
            ("stage_total_weight", opt_int(self.stage_total_weight)),
            ("stage_completed_weight", opt_int(self.stage_completed_weight)),
            ("source_path", opt_text(&self.source_path)),
            ("output_path", opt_text(&self.output_path)),
            ("started_at", opt_text(&self.started_at)),
            ("finished_at", opt_text(&self.finished_at)),
            ("duration_ms", opt_int(self.duration_ms)),
            ("updated_at", text(&self.updated_at)),
        ]
    }

    /// Columns whose value differs between `before` and `after`.
    pub fn changed_columns(before: &JobRow, after: &JobRow) -> Vec<(&'static str, Value)> {
        before
            .mutable_columns()
            .into_iter()
            .zip(after.mutable_columns())
            .filter(|((_, old), (_, new))| old != new)
            .map(|(_, changed)| changed)
            .collect()
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: &Option<String>) -> Value {
    s.as_ref().map_or(Value::Null, |s| Value::Text(s.clone()))
}

fn opt_int(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Integer)
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, target_kind, target_id, field_name, kind, status, task_id,
         attempt, max_attempts, progress, message, error, heartbeat_at, stage, stage_index,
         stage_count, stage_weight, stage_progress, stage_started_at, stage_plan,
         stage_total_weight, stage_completed_weight, source_path, output_path, created_at,
         started_at, finished_at, duration_ms, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)",
        params![
            job.id,
            job.target_kind,
            job.target_id,
            job.field_name,
            job.kind,
            job.status,
            job.task_id,
            job.attempt,
            job.max_attempts,
            job.progress,
            job.message,
            job.error,
            job.heartbeat_at,
            job.stage,
            job.stage_index,
            job.stage_count,
            job.stage_weight,
            job.stage_progress,
            job.stage_started_at,
            job.stage_plan,
            job.stage_total_weight,
            job.stage_completed_weight,
            job.source_path,
            job.output_path,
            job.created_at,
            job.started_at,
            job.finished_at,
            job.duration_ms,
            job.updated_at,
        ],
    )?;
    Ok(())
}

/// Writes only the given columns of one job. Returns the number of rows
/// touched (0 when the job does not exist).
pub fn update_columns(
    conn: &Connection,
    id: &str,
    columns: &[(&'static str, Value)],
) -> Result<usize, DatabaseError> {
    if columns.is_empty() {
        return Ok(0);
    }

    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{} = ?{}", name, i + 2))
        .collect();
    let sql = format!("UPDATE jobs SET {} WHERE id = ?1", assignments.join(", "));

    let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(columns.len() + 1);
    values.push(&id);
    for (_, value) in columns {
        values.push(value);
    }

    Ok(conn.execute(&sql, values.as_slice())?)
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds the job for a (target, field) pair, or the most recently updated
/// job of the target when `field_name` is `None`.
pub fn find_by_target(
    conn: &Connection,
    target_kind: &str,
    target_id: &str,
    field_name: Option<&str>,
) -> Result<Option<JobRow>, DatabaseError> {
    let row = match field_name {
        Some(field) => conn
            .query_row(
                "SELECT * FROM jobs WHERE target_kind = ?1 AND target_id = ?2 AND field_name = ?3",
                params![target_kind, target_id, field],
                JobRow::from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT * FROM jobs WHERE target_kind = ?1 AND target_id = ?2
                 ORDER BY updated_at DESC LIMIT 1",
                params![target_kind, target_id],
                JobRow::from_row,
            )
            .optional()?,
    };
    Ok(row)
}

/// Lists every job of a target, ordered by field name.
pub fn list_by_target(
    conn: &Connection,
    target_kind: &str,
    target_id: &str,
) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM jobs WHERE target_kind = ?1 AND target_id = ?2 ORDER BY field_name",
    )?;
    let rows = stmt
        .query_map(params![target_kind, target_id], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Processing jobs whose heartbeat is missing or older than `cutoff`,
/// missing heartbeats first, then oldest first.
pub fn find_stale_processing(
    conn: &Connection,
    cutoff: &str,
    limit: u32,
) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM jobs
         WHERE status = 'processing' AND (heartbeat_at IS NULL OR heartbeat_at < ?1)
         ORDER BY heartbeat_at IS NOT NULL, heartbeat_at ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![cutoff, limit], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Marks one job failed, but only while it is still processing.
/// `message` replaces the stored message. Returns whether the row was changed.
pub fn fail_if_processing(
    conn: &Connection,
    id: &str,
    error: &str,
    message: Option<&str>,
    progress: i64,
    finished_at: &str,
    duration_ms: Option<i64>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'failed', error = ?2, message = ?3, progress = ?4,
         finished_at = ?5, duration_ms = ?6, updated_at = ?5
         WHERE id = ?1 AND status = 'processing'",
        params![id, error, message, progress, finished_at, duration_ms],
    )?;
    Ok(changed > 0)
}

/// Deletes terminal jobs that finished before `cutoff`.
pub fn delete_terminal_before(conn: &Connection, cutoff: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM jobs
         WHERE status IN ('done', 'failed', 'canceled')
           AND finished_at IS NOT NULL AND finished_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_row(id: &str, field: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            target_kind: "post".to_string(),
            target_id: "1".to_string(),
            field_name: field.to_string(),
            kind: "video".to_string(),
            status: "processing".to_string(),
            task_id: Some("task".to_string()),
            attempt: 1,
            max_attempts: 3,
            progress: 10,
            message: None,
            error: None,
            heartbeat_at: Some("2026-01-01T00:00:00.000Z".to_string()),
            stage: None,
            stage_index: None,
            stage_count: None,
            stage_weight: None,
            stage_progress: None,
            stage_started_at: None,
            stage_plan: None,
            stage_total_weight: None,
            stage_completed_weight: None,
            source_path: Some("uploads/a.mov".to_string()),
            output_path: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            started_at: Some("2026-01-01T00:00:00.000Z".to_string()),
            finished_at: None,
            duration_ms: None,
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_row("j1", "video"))?;
            let found = find_by_id(conn, "j1")?.unwrap();
            assert_eq!(found.field_name, "video");
            assert_eq!(found.status, "processing");
            assert!(find_by_id(conn, "missing")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_by_target_with_and_without_field() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_row("j1", "video"))?;
            let mut thumb = sample_row("j2", "thumbnail");
            thumb.updated_at = "2026-01-02T00:00:00.000Z".to_string();
            insert(conn, &thumb)?;

            let video = find_by_target(conn, "post", "1", Some("video"))?.unwrap();
            assert_eq!(video.id, "j1");
            let latest = find_by_target(conn, "post", "1", None)?.unwrap();
            assert_eq!(latest.id, "j2");
            assert!(find_by_target(conn, "post", "2", None)?.is_none());

            let all = list_by_target(conn, "post", "1")?;
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].field_name, "thumbnail");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_changed_columns_only_reports_differences() {
        let before = sample_row("j1", "video");
        let mut after = before.clone();
        after.progress = 55;
        after.message = Some("Encoding".to_string());

        let changed = JobRow::changed_columns(&before, &after);
        let names: Vec<&str> = changed.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["progress", "message"]);
    }

    #[test]
    fn test_update_columns_leaves_other_fields() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_row("j1", "video"))?;
            let touched = update_columns(
                conn,
                "j1",
                &[("progress", Value::Integer(70)), ("message", Value::Null)],
            )?;
            assert_eq!(touched, 1);
            let row = find_by_id(conn, "j1")?.unwrap();
            assert_eq!(row.progress, 70);
            assert_eq!(row.source_path.as_deref(), Some("uploads/a.mov"));

            assert_eq!(update_columns(conn, "nope", &[("progress", Value::Integer(1))])?, 0);
            assert_eq!(update_columns(conn, "j1", &[])?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_stale_orders_missing_heartbeat_first() {
        let db = test_db();
        db.with_conn(|conn| {
            let mut old = sample_row("old", "video");
            old.heartbeat_at = Some("2026-01-01T00:00:00.000Z".to_string());
            insert(conn, &old)?;

            let mut none = sample_row("none", "audio");
            none.heartbeat_at = None;
            insert(conn, &none)?;

            let mut fresh = sample_row("fresh", "thumbnail");
            fresh.heartbeat_at = Some("2026-01-01T00:10:00.000Z".to_string());
            insert(conn, &fresh)?;

            let mut done = sample_row("done", "poster");
            done.status = "done".to_string();
            done.heartbeat_at = None;
            insert(conn, &done)?;

            let stale = find_stale_processing(conn, "2026-01-01T00:05:00.000Z", 10)?;
            let ids: Vec<&str> = stale.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["none", "old"]);

            let limited = find_stale_processing(conn, "2026-01-01T00:05:00.000Z", 1)?;
            assert_eq!(limited.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_fail_if_processing_is_conditional() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_row("j1", "video"))?;
            assert!(fail_if_processing(
                conn,
                "j1",
                "stale",
                Some("Encoding 720p rendition"),
                10,
                "2026-01-01T01:00:00.000Z",
                Some(3_600_000)
            )?);
            // Second attempt sees a failed job and does nothing.
            assert!(!fail_if_processing(
                conn,
                "j1",
                "stale",
                None,
                10,
                "2026-01-01T02:00:00.000Z",
                None
            )?);
            let row = find_by_id(conn, "j1")?.unwrap();
            assert_eq!(row.status, "failed");
            assert_eq!(row.message.as_deref(), Some("Encoding 720p rendition"));
            assert_eq!(row.finished_at.as_deref(), Some("2026-01-01T01:00:00.000Z"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_terminal_before() {
        let db = test_db();
        db.with_conn(|conn| {
            let mut done = sample_row("done", "video");
            done.status = "done".to_string();
            done.finished_at = Some("2026-01-01T00:00:00.000Z".to_string());
            insert(conn, &done)?;
            insert(conn, &sample_row("running", "audio"))?;

            assert_eq!(delete_terminal_before(conn, "2026-02-01T00:00:00.000Z")?, 1);
            assert!(find_by_id(conn, "running")?.is_some());
            Ok(())
        })
        .unwrap();
    }
}
