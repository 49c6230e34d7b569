//! Enrollment movement log (enrollments, transfers, withdrawals) with a
//! best-effort guard against double-submitted forms.
//!
//! The guard is a query followed by an insert, not a transaction: two
//! submissions racing from separate processes can both land. Delivery is
//! at-least-once with best-effort dedup.

use crate::error::CoreResult;
use crate::store::new_id;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Movement {
    pub student_id: String,
    pub kind: String,
    pub course_from: Option<String>,
    pub course_to: Option<String>,
    pub course: Option<String>,
    pub reason: Option<String>,
    pub destination_school: Option<String>,
}

impl Movement {
    /// Non-empty optional fields, the ones that make two movements distinct.
    fn key_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("course_from", &self.course_from),
            ("course_to", &self.course_to),
            ("course", &self.course),
            ("reason", &self.reason),
            ("destination_school", &self.destination_school),
        ]
        .into_iter()
        .filter_map(|(col, v)| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| (col, s))
        })
        .collect()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn recent_duplicate(
    conn: &Connection,
    m: &Movement,
    since: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let mut sql = String::from(
        "SELECT COUNT(*) FROM movements WHERE student_id = ? AND kind = ? AND recorded_at >= ?",
    );
    let mut values = vec![
        Value::Text(m.student_id.clone()),
        Value::Text(m.kind.clone()),
        Value::Text(timestamp(since)),
    ];
    for (col, v) in m.key_fields() {
        sql.push_str(&format!(" AND {col} = ?"));
        values.push(Value::Text(v.to_string()));
    }
    let n: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
    Ok(n > 0)
}

fn insert(conn: &Connection, m: &Movement, at: DateTime<Utc>) -> CoreResult<String> {
    let id = new_id();
    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    conn.execute(
        "INSERT INTO movements(id, student_id, kind, course_from, course_to, course, reason,
                               destination_school, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &m.student_id,
            &m.kind,
            clean(&m.course_from),
            clean(&m.course_to),
            clean(&m.course),
            clean(&m.reason),
            clean(&m.destination_school),
            timestamp(at),
        ),
    )?;
    Ok(id)
}

/// Short-TTL idempotency check: runs `insert` unless `recent` reports a match.
/// A failing lookup is logged and treated as "no match".
pub fn insert_unless_recent<T>(
    recent: impl FnOnce() -> rusqlite::Result<bool>,
    insert: impl FnOnce() -> CoreResult<T>,
) -> CoreResult<Option<T>> {
    match recent() {
        Ok(true) => return Ok(None),
        Ok(false) => {}
        Err(e) => {
            // Losing a movement is worse than recording it twice.
            warn!(error = %e, "duplicate check failed; inserting anyway");
        }
    }
    insert().map(Some)
}

/// Inserts the movement unless an identical one was recorded within `window`
/// before `at`. Returns the new id, or `None` when it was a duplicate.
pub fn record_movement_at(
    conn: &Connection,
    window: Duration,
    m: &Movement,
    at: DateTime<Utc>,
) -> CoreResult<Option<String>> {
    let since = chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| at.checked_sub_signed(w))
        .unwrap_or(at);
    let id = insert_unless_recent(|| recent_duplicate(conn, m, since), || insert(conn, m, at))?;
    if id.is_none() {
        debug!(student = %m.student_id, kind = %m.kind, "duplicate movement ignored");
    }
    Ok(id)
}

pub fn record_movement(
    conn: &Connection,
    window: Duration,
    m: &Movement,
) -> CoreResult<Option<String>> {
    record_movement_at(conn, window, m, Utc::now())
}

pub fn list_movements(
    conn: &Connection,
    student_id: Option<&str>,
) -> CoreResult<Vec<serde_json::Value>> {
    let mut sql = String::from(
        "SELECT id, student_id, kind, course_from, course_to, course, reason, destination_school,
                recorded_at
         FROM movements",
    );
    let mut values: Vec<Value> = Vec::new();
    if let Some(s) = student_id {
        sql.push_str(" WHERE student_id = ?");
        values.push(Value::Text(s.to_string()));
    }
    sql.push_str(" ORDER BY recorded_at DESC, rowid DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "courseFrom": r.get::<_, Option<String>>(3)?,
                "courseTo": r.get::<_, Option<String>>(4)?,
                "course": r.get::<_, Option<String>>(5)?,
                "reason": r.get::<_, Option<String>>(6)?,
                "destinationSchool": r.get::<_, Option<String>>(7)?,
                "recordedAt": r.get::<_, String>(8)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
