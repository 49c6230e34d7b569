use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "schoolbook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            roles TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            schedule_grid TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_name ON teachers(last_name, first_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS absences(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            date TEXT NOT NULL,
            cause TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            sub_name TEXT,
            sub_id_number TEXT,
            sub_class TEXT,
            sub_subject TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    // Older workspaces predate the coverage flags the edit screen sets.
    ensure_absences_coverage_flags(&conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_absences_teacher_date ON absences(teacher_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_absences_date ON absences(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS calendar_exceptions(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS movements(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            course_from TEXT,
            course_to TEXT,
            course TEXT,
            reason TEXT,
            destination_school TEXT,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_movements_student
         ON movements(student_id, kind, recorded_at)",
        [],
    )?;

    Ok(conn)
}

fn ensure_absences_coverage_flags(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "absences", "covered")? {
        conn.execute(
            "ALTER TABLE absences ADD COLUMN covered INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "absences", "coverage_kind")? {
        conn.execute(
            "ALTER TABLE absences ADD COLUMN coverage_kind TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
