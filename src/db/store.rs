//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Probe results ---

    /// Append a probe result and return its row id.
    pub fn insert_probe_result(&self, result: &ProbeResult) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO probe_results (target_id, status, latency_ms, observed_at, error_message, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.target_id,
                result.status.to_string(),
                result.latency_ms.map(|v| v as i64),
                format_db_time(&result.observed_at),
                result.error_message,
                result.metadata.as_ref().map(|m| m.to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent result for a target, if any.
    pub fn latest_probe_result(&self, target_id: &str) -> Result<Option<ProbeResult>, DbError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT id, target_id, status, latency_ms, observed_at, error_message, metadata \
                 FROM probe_results WHERE target_id = ?1 ORDER BY id DESC LIMIT 1",
                params![target_id],
                row_to_probe_result,
            )
            .optional()?;
        Ok(result)
    }

    /// Newest-first window of results for a target.
    pub fn recent_probe_results(
        &self,
        target_id: &str,
        limit: i64,
    ) -> Result<Vec<ProbeResult>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_id, status, latency_ms, observed_at, error_message, metadata \
             FROM probe_results WHERE target_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let results = stmt
            .query_map(params![target_id, limit], row_to_probe_result)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(results)
    }

    /// Newest-first results for a target observed at or after the cutoff.
    pub fn probe_results_since(
        &self,
        target_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_id, status, latency_ms, observed_at, error_message, metadata \
             FROM probe_results WHERE target_id = ?1 AND observed_at >= ?2 ORDER BY id DESC",
        )?;

        let results = stmt
            .query_map(
                params![target_id, format_db_time(&cutoff)],
                row_to_probe_result,
            )?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(results)
    }

    /// Number of stored results for a target.
    pub fn count_probe_results(&self, target_id: &str) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM probe_results WHERE target_id = ?1",
            params![target_id],
            |row| row.get(0),
        )?)
    }

    /// Row id of the `n`-th most recent result for a target (1-based).
    ///
    /// Retention uses this as the cut line: rows with smaller ids are the
    /// excess beyond the newest `n`.
    pub fn nth_newest_probe_result_id(
        &self,
        target_id: &str,
        n: i64,
    ) -> Result<Option<i64>, DbError> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT id FROM probe_results WHERE target_id = ?1 \
                 ORDER BY id DESC LIMIT 1 OFFSET ?2",
                params![target_id, n - 1],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Delete a target's results with ids strictly below the cutoff.
    /// Returns the number of rows removed.
    pub fn delete_probe_results_before(
        &self,
        target_id: &str,
        cutoff_id: i64,
    ) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM probe_results WHERE target_id = ?1 AND id < ?2",
            params![target_id, cutoff_id],
        )?;
        Ok(deleted)
    }

    // --- Workflow alert events ---

    /// Append an alert event and return its row id.
    pub fn insert_alert_event(&self, event: &WorkflowAlertEvent) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO workflow_alert_events (event_type, target_id, payload, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.event_type,
                event.target_id,
                event.payload.to_string(),
                format_db_time(&event.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Number of alert events recorded for a target.
    pub fn count_alert_events(&self, target_id: &str) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM workflow_alert_events WHERE target_id = ?1",
            params![target_id],
            |row| row.get(0),
        )?)
    }

    // --- Recommendations ---

    /// Append a recommendation and return its row id.
    pub fn insert_recommendation(&self, rec: &Recommendation) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO recommendations (recommendation_type, priority, title, description, \
             target_id, actionable, status, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rec.recommendation_type,
                rec.priority,
                rec.title,
                rec.description,
                rec.target_id,
                if rec.actionable { 1 } else { 0 },
                rec.status,
                rec.metadata.to_string(),
                format_db_time(&rec.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest-first recommendations with the given status.
    pub fn recommendations_by_status(
        &self,
        status: &str,
        limit: i64,
    ) -> Result<Vec<Recommendation>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, recommendation_type, priority, title, description, target_id, \
             actionable, status, metadata, created_at \
             FROM recommendations WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;

        let recommendations = stmt
            .query_map(params![status, limit], row_to_recommendation)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(recommendations)
    }
}

fn row_to_probe_result(row: &rusqlite::Row<'_>) -> SqlResult<ProbeResult> {
    let observed_at: String = row.get(4)?;
    let metadata: Option<String> = row.get(6)?;
    Ok(ProbeResult {
        id: Some(row.get(0)?),
        target_id: row.get(1)?,
        status: ProbeStatus::parse(&row.get::<_, String>(2)?),
        latency_ms: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
        observed_at: parse_db_time(&observed_at).unwrap_or_else(Utc::now),
        error_message: row.get(5)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

fn row_to_recommendation(row: &rusqlite::Row<'_>) -> SqlResult<Recommendation> {
    let metadata: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(Recommendation {
        id: Some(row.get(0)?),
        recommendation_type: row.get(1)?,
        priority: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        target_id: row.get(5)?,
        actionable: row.get::<_, i64>(6)? != 0,
        status: row.get(7)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: parse_db_time(&created_at).unwrap_or_else(Utc::now),
    })
}

/// Format a datetime for storage. Fixed fractional width keeps text order
/// identical to chronological order.
fn format_db_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    // Try various formats
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn test_store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn probe_result_round_trip() {
        let (_tmp, store) = test_store();

        let healthy = ProbeResult::healthy("svc", 120, json!({"status": "ok"}));
        let id = store.insert_probe_result(&healthy).unwrap();
        assert!(id > 0);

        let fetched = store.latest_probe_result("svc").unwrap().unwrap();
        assert_eq!(fetched.id, Some(id));
        assert_eq!(fetched.status, ProbeStatus::Healthy);
        assert_eq!(fetched.latency_ms, Some(120));
        assert_eq!(fetched.metadata, Some(json!({"status": "ok"})));
        assert!(fetched.error_message.is_none());
    }

    #[test]
    fn error_result_keeps_nulls() {
        let (_tmp, store) = test_store();

        let failed = ProbeResult::error("svc", None, "connection refused".to_string());
        store.insert_probe_result(&failed).unwrap();

        let fetched = store.latest_probe_result("svc").unwrap().unwrap();
        assert_eq!(fetched.status, ProbeStatus::Error);
        assert!(fetched.latency_ms.is_none());
        assert!(fetched.metadata.is_none());
        assert_eq!(fetched.error_message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn recent_results_are_newest_first() {
        let (_tmp, store) = test_store();

        for latency in [10, 20, 30] {
            let result = ProbeResult::healthy("svc", latency, json!({}));
            store.insert_probe_result(&result).unwrap();
        }

        let recent = store.recent_probe_results("svc", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].latency_ms, Some(30));
        assert_eq!(recent[1].latency_ms, Some(20));

        assert_eq!(store.count_probe_results("svc").unwrap(), 3);
        assert_eq!(store.count_probe_results("other").unwrap(), 0);
    }

    #[test]
    fn nth_newest_and_delete_before() {
        let (_tmp, store) = test_store();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let result = ProbeResult::healthy("svc", 1, json!({}));
            ids.push(store.insert_probe_result(&result).unwrap());
        }

        // 2nd newest of five rows is the 4th inserted.
        let cutoff = store.nth_newest_probe_result_id("svc", 2).unwrap().unwrap();
        assert_eq!(cutoff, ids[3]);

        let deleted = store.delete_probe_results_before("svc", cutoff).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count_probe_results("svc").unwrap(), 2);

        assert!(store
            .nth_newest_probe_result_id("svc", 10)
            .unwrap()
            .is_none());
    }

    #[test]
    fn results_since_cutoff() {
        let (_tmp, store) = test_store();

        let mut old = ProbeResult::healthy("svc", 5, json!({}));
        old.observed_at = Utc::now() - chrono::Duration::hours(48);
        store.insert_probe_result(&old).unwrap();

        let fresh = ProbeResult::healthy("svc", 7, json!({}));
        store.insert_probe_result(&fresh).unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let window = store.probe_results_since("svc", cutoff).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].latency_ms, Some(7));
    }

    #[test]
    fn alert_events_round_trip() {
        let (_tmp, store) = test_store();

        let result = ProbeResult::unhealthy("svc", 9, "HTTP 503".to_string());
        let event = WorkflowAlertEvent::for_result(&result);
        store.insert_alert_event(&event).unwrap();

        assert_eq!(store.count_alert_events("svc").unwrap(), 1);
        assert_eq!(store.count_alert_events("other").unwrap(), 0);
    }

    #[test]
    fn recommendations_filtered_by_status() {
        let (_tmp, store) = test_store();

        let mut rec = Recommendation {
            id: None,
            recommendation_type: "performance".to_string(),
            priority: "high".to_string(),
            title: "Tune timeouts".to_string(),
            description: "Raise the probe timeout".to_string(),
            target_id: "svc".to_string(),
            actionable: true,
            status: "active".to_string(),
            metadata: json!({"source": "test"}),
            created_at: Utc::now(),
        };
        store.insert_recommendation(&rec).unwrap();

        rec.status = "dismissed".to_string();
        rec.title = "Old advice".to_string();
        store.insert_recommendation(&rec).unwrap();

        let active = store.recommendations_by_status("active", 10).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Tune timeouts");
        assert!(active[0].actionable);
        assert_eq!(active[0].metadata["source"], "test");
    }

    #[test]
    fn parse_db_time_formats() {
        assert!(parse_db_time("2024-01-01 12:34:56.123456789").is_some());
        assert!(parse_db_time("2024-01-01 12:34:56").is_some());
        assert!(parse_db_time("2024-01-01T12:34:56Z").is_some());
        assert!(parse_db_time("not a time").is_none());
    }
}
