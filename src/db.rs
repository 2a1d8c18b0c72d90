use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "schoold.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            status TEXT NOT NULL,
            guardian_name TEXT,
            guardian_phone TEXT,
            guardian_email TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_results(
            class_name TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            first_ca REAL NOT NULL,
            second_ca REAL NOT NULL,
            exam REAL NOT NULL,
            total REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(class_name, subject_id, student_id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_results_student ON subject_results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_scale(
            position INTEGER PRIMARY KEY,
            grade TEXT NOT NULL,
            range_start REAL NOT NULL,
            range_end REAL NOT NULL,
            remark TEXT NOT NULL
        )",
        [],
    )?;
    seed_grade_scale(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_ratings(
            student_id TEXT NOT NULL,
            domain TEXT NOT NULL,
            trait TEXT NOT NULL,
            value INTEGER NOT NULL,
            PRIMARY KEY(student_id, domain, trait),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS report_meta(
            student_id TEXT PRIMARY KEY,
            days_opened INTEGER,
            days_present INTEGER,
            teacher_comment TEXT,
            principal_comment TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            salary INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            description TEXT NOT NULL,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL,
            due_date TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_student ON invoices(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL,
            invoice_id TEXT,
            staff_id TEXT,
            date TEXT NOT NULL,
            FOREIGN KEY(invoice_id) REFERENCES invoices(id),
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admissions(
            id TEXT PRIMARY KEY,
            applicant_name TEXT NOT NULL,
            desired_class TEXT NOT NULL,
            guardian_name TEXT,
            guardian_phone TEXT,
            guardian_email TEXT,
            status TEXT NOT NULL,
            student_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before guardian email existed.
    ensure_students_guardian_email(&conn)?;

    Ok(conn)
}

/// Default scale for a fresh workspace. Upper bounds end at .99 because
/// percentages are rounded to two decimals before lookup.
const DEFAULT_GRADE_SCALE: &[(&str, f64, f64, &str)] = &[
    ("A", 70.0, 100.0, "Excellent"),
    ("B", 60.0, 69.99, "Very Good"),
    ("C", 50.0, 59.99, "Good"),
    ("D", 45.0, 49.99, "Fair"),
    ("E", 40.0, 44.99, "Pass"),
    ("F", 0.0, 39.99, "Fail"),
];

fn seed_grade_scale(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM grade_scale", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    // An explicitly emptied scale is stored as this marker so it is not reseeded.
    if settings_get_json(conn, "grading.scale.cleared")?.is_some() {
        return Ok(());
    }
    for (i, (grade, start, end, remark)) in DEFAULT_GRADE_SCALE.iter().enumerate() {
        conn.execute(
            "INSERT INTO grade_scale(position, grade, range_start, range_end, remark)
             VALUES(?, ?, ?, ?, ?)",
            (i as i64, grade, start, end, remark),
        )?;
    }
    Ok(())
}

fn ensure_students_guardian_email(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "guardian_email")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN guardian_email TEXT", [])?;
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

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("settings value for {} is not valid JSON", key))?;
    Ok(Some(value))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
