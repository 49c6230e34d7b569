use crate::error::{CoreError, CoreResult};
use crate::model::{
    iso, join_roles, split_roles, Absence, CalendarException, Coverage, ExceptionKind,
    ScheduleGrid, Teacher,
};
use crate::schedule::{year_bounds, CalendarExceptions};
use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_text(v: Option<String>) -> String {
    v.unwrap_or_default()
}

fn non_empty(s: &str) -> Option<&str> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

// ---------------------------------------------------------------- teachers

const TEACHER_COLUMNS: &str = "id, last_name, first_name, roles, status, schedule_grid";

/// A teacher row as stored; the grid is parsed once the row is out of SQLite.
struct TeacherRow {
    id: String,
    last_name: String,
    first_name: String,
    roles: String,
    status: String,
    grid: String,
}

impl TeacherRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TeacherRow {
            id: row.get(0)?,
            last_name: row.get(1)?,
            first_name: row.get(2)?,
            roles: row.get(3)?,
            status: row.get(4)?,
            grid: row.get(5)?,
        })
    }

    fn into_teacher(self) -> CoreResult<Teacher> {
        let grid = serde_json::from_str::<serde_json::Value>(&self.grid)
            .map_err(|e| e.to_string())
            .and_then(|v| ScheduleGrid::from_json(&v));
        let grid = match grid {
            Ok(grid) => grid,
            Err(reason) => {
                warn!(teacher = %self.id, reason = %reason, "stored schedule grid is unreadable");
                return Err(CoreError::Corrupt {
                    teacher_id: self.id,
                    reason,
                });
            }
        };
        Ok(Teacher {
            id: self.id,
            last_name: self.last_name,
            first_name: self.first_name,
            roles: split_roles(&self.roles),
            status: self.status,
            grid,
        })
    }
}

pub fn list_teachers(conn: &Connection) -> CoreResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEACHER_COLUMNS} FROM teachers ORDER BY last_name, first_name, rowid"
    ))?;
    let rows = stmt
        .query_map([], TeacherRow::read)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TeacherRow::into_teacher).collect()
}

pub fn get_teacher(conn: &Connection, teacher_id: &str) -> CoreResult<Option<Teacher>> {
    conn.query_row(
        &format!("SELECT {TEACHER_COLUMNS} FROM teachers WHERE id = ?"),
        [teacher_id],
        TeacherRow::read,
    )
    .optional()?
    .map(TeacherRow::into_teacher)
    .transpose()
}

pub fn require_teacher(conn: &Connection, teacher_id: &str) -> CoreResult<Teacher> {
    get_teacher(conn, teacher_id)?.ok_or(CoreError::NotFound("teacher"))
}

pub fn insert_teacher(conn: &Connection, teacher: &Teacher) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO teachers(id, last_name, first_name, roles, status, schedule_grid)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &teacher.id,
            &teacher.last_name,
            &teacher.first_name,
            join_roles(&teacher.roles),
            &teacher.status,
            teacher.grid.to_json().to_string(),
        ),
    )?;
    Ok(())
}

/// Field patch for a teacher; the timetable is deliberately absent.
#[derive(Debug, Default)]
pub struct TeacherPatch {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub roles: Option<Vec<String>>,
    pub status: Option<String>,
}

impl TeacherPatch {
    pub fn is_empty(&self) -> bool {
        self.last_name.is_none()
            && self.first_name.is_none()
            && self.roles.is_none()
            && self.status.is_none()
    }
}

pub fn update_teacher(
    conn: &Connection,
    teacher_id: &str,
    patch: &TeacherPatch,
) -> CoreResult<()> {
    if patch.is_empty() {
        return Err(CoreError::validation("no changes"));
    }
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(v) = &patch.last_name {
        sets.push("last_name = ?");
        values.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.first_name {
        sets.push("first_name = ?");
        values.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.roles {
        sets.push("roles = ?");
        values.push(Value::Text(join_roles(v)));
    }
    if let Some(v) = &patch.status {
        sets.push("status = ?");
        values.push(Value::Text(v.clone()));
    }
    values.push(Value::Text(teacher_id.to_string()));
    let sql = format!("UPDATE teachers SET {} WHERE id = ?", sets.join(", "));
    let changed = conn.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(CoreError::NotFound("teacher"));
    }
    Ok(())
}

pub fn set_schedule(conn: &Connection, teacher_id: &str, grid: &ScheduleGrid) -> CoreResult<()> {
    let changed = conn.execute(
        "UPDATE teachers SET schedule_grid = ? WHERE id = ?",
        (grid.to_json().to_string(), teacher_id),
    )?;
    if changed == 0 {
        return Err(CoreError::NotFound("teacher"));
    }
    Ok(())
}

/// Removes the teacher and every absence recorded for them. Returns the number
/// of absences removed.
pub fn delete_teacher(conn: &Connection, teacher_id: &str) -> CoreResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM absences WHERE teacher_id = ?", [teacher_id])?;
    let deleted = tx.execute("DELETE FROM teachers WHERE id = ?", [teacher_id])?;
    if deleted == 0 {
        tx.rollback()?;
        return Err(CoreError::NotFound("teacher"));
    }
    tx.commit()?;
    Ok(removed)
}

// ---------------------------------------------------------------- absences

const ABSENCE_COLUMNS: &str = "a.id, a.teacher_id, a.date, a.cause, a.notes, a.sub_name, \
     a.sub_id_number, a.sub_class, a.sub_subject, a.covered, a.coverage_kind";

fn absence_from_row(row: &Row<'_>) -> rusqlite::Result<Absence> {
    let coverage = Coverage {
        name: opt_text(row.get(5)?),
        id_number: opt_text(row.get(6)?),
        class_name: opt_text(row.get(7)?),
        subject: opt_text(row.get(8)?),
    };
    Ok(Absence {
        id: row.get(0)?,
        teacher_id: row.get(1)?,
        date: date_column(row, 2)?,
        cause: row.get(3)?,
        notes: row.get(4)?,
        coverage: if coverage.is_empty() {
            None
        } else {
            Some(coverage)
        },
        covered: row.get::<_, i64>(9)? != 0,
        coverage_kind: row.get(10)?,
    })
}

/// Optional filters shared by the history screens and the reports. Dates are
/// inclusive.
#[derive(Debug, Default, Clone)]
pub struct AbsenceQuery {
    pub teacher_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AbsenceQuery {
    pub fn teacher_between(teacher_id: &str, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            teacher_id: Some(teacher_id.to_string()),
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            teacher_id: None,
            from: Some(from),
            to: Some(to),
        }
    }
}

/// Rows in date order (ties by insertion).
pub fn query_absences(conn: &Connection, q: &AbsenceQuery) -> CoreResult<Vec<Absence>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(t) = &q.teacher_id {
        clauses.push("a.teacher_id = ?");
        values.push(Value::Text(t.clone()));
    }
    // ISO strings order the same way as the dates they encode.
    if let Some(d) = q.from {
        clauses.push("a.date >= ?");
        values.push(Value::Text(iso(d)));
    }
    if let Some(d) = q.to {
        clauses.push("a.date <= ?");
        values.push(Value::Text(iso(d)));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {ABSENCE_COLUMNS} FROM absences a {where_sql} ORDER BY a.date, a.rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), absence_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_absence(conn: &Connection, absence_id: &str) -> CoreResult<Option<Absence>> {
    let row = conn
        .query_row(
            &format!("SELECT {ABSENCE_COLUMNS} FROM absences a WHERE a.id = ?"),
            [absence_id],
            absence_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Id of the absence already recorded for the teacher on that date, if any.
pub fn absence_on(
    conn: &Connection,
    teacher_id: &str,
    date: NaiveDate,
) -> CoreResult<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM absences WHERE teacher_id = ? AND date = ?",
            (teacher_id, iso(date)),
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(id)
}

fn coverage_values(c: &Option<Coverage>) -> [Option<String>; 4] {
    match c {
        Some(c) => [
            non_empty(&c.name).map(str::to_string),
            non_empty(&c.id_number).map(str::to_string),
            non_empty(&c.class_name).map(str::to_string),
            non_empty(&c.subject).map(str::to_string),
        ],
        None => [None, None, None, None],
    }
}

/// All rows land or none do.
pub fn insert_absences(conn: &Connection, rows: &[Absence]) -> CoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    let created_at = chrono::Utc::now().to_rfc3339();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO absences(id, teacher_id, date, cause, notes, sub_name, sub_id_number,
                                  sub_class, sub_subject, covered, coverage_kind, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for a in rows {
            let [name, id_number, class_name, subject] = coverage_values(&a.coverage);
            stmt.execute((
                &a.id,
                &a.teacher_id,
                iso(a.date),
                &a.cause,
                &a.notes,
                name,
                id_number,
                class_name,
                subject,
                a.covered as i64,
                &a.coverage_kind,
                &created_at,
            ))?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn update_absence(conn: &Connection, a: &Absence) -> CoreResult<()> {
    let [name, id_number, class_name, subject] = coverage_values(&a.coverage);
    let changed = conn.execute(
        "UPDATE absences SET date = ?, cause = ?, notes = ?, sub_name = ?, sub_id_number = ?,
                sub_class = ?, sub_subject = ?, covered = ?, coverage_kind = ?
         WHERE id = ?",
        (
            iso(a.date),
            &a.cause,
            &a.notes,
            name,
            id_number,
            class_name,
            subject,
            a.covered as i64,
            &a.coverage_kind,
            &a.id,
        ),
    )?;
    if changed == 0 {
        return Err(CoreError::NotFound("absence"));
    }
    Ok(())
}

pub fn delete_absence(conn: &Connection, absence_id: &str) -> CoreResult<bool> {
    let deleted = conn.execute("DELETE FROM absences WHERE id = ?", [absence_id])?;
    Ok(deleted > 0)
}

// ------------------------------------------------------ calendar exceptions

pub fn exceptions_for_year(conn: &Connection, year: i32) -> CoreResult<Vec<CalendarException>> {
    let Some((from, to)) = year_bounds(year) else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT id, date, kind, reason FROM calendar_exceptions
         WHERE date >= ? AND date <= ?
         ORDER BY date",
    )?;
    let rows = stmt
        .query_map((iso(from), iso(to)), |r| {
            let kind: String = r.get(2)?;
            Ok(CalendarException {
                id: r.get(0)?,
                date: date_column(r, 1)?,
                kind: ExceptionKind::parse(&kind).unwrap_or(ExceptionKind::Holiday),
                reason: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn exception_dates(conn: &Connection, year: i32) -> CoreResult<CalendarExceptions> {
    Ok(exceptions_for_year(conn, year)?
        .into_iter()
        .map(|e| e.date)
        .collect())
}

/// Inserts or replaces the exception for `date`; returns its id.
pub fn upsert_exception(
    conn: &Connection,
    date: NaiveDate,
    kind: ExceptionKind,
    reason: &str,
) -> CoreResult<String> {
    conn.execute(
        "INSERT INTO calendar_exceptions(id, date, kind, reason)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(date) DO UPDATE SET
           kind = excluded.kind,
           reason = excluded.reason",
        (new_id(), iso(date), kind.as_str(), reason),
    )?;
    let id = conn.query_row(
        "SELECT id FROM calendar_exceptions WHERE date = ?",
        [iso(date)],
        |r| r.get::<_, String>(0),
    )?;
    Ok(id)
}

pub fn delete_exception(conn: &Connection, exception_id: &str) -> CoreResult<bool> {
    let deleted = conn.execute(
        "DELETE FROM calendar_exceptions WHERE id = ?",
        [exception_id],
    )?;
    Ok(deleted > 0)
}
