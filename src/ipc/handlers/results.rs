use crate::calc::{self, ScoreEntry, SubjectResult};
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{db_conn, opt_str, required_f64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{HashMap, HashSet};

use super::grading::load_scale;
use super::setup::load_component_max;

pub fn subject_names(conn: &Connection) -> Result<HashMap<String, String>, HandlerErr> {
    let mut stmt = conn.prepare("SELECT id, name FROM subjects")?;
    let pairs = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())?;
    Ok(pairs)
}

fn student_names(conn: &Connection, class_name: &str) -> Result<HashMap<String, String>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.name
         FROM students s
         WHERE s.class_name = ?1
            OR s.id IN (SELECT student_id FROM subject_results WHERE class_name = ?1)",
    )?;
    let pairs = stmt
        .query_map([class_name], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())?;
    Ok(pairs)
}

/// Every row for the class, ordered by subject then student id.
pub fn load_class_rows(conn: &Connection, class_name: &str) -> Result<Vec<SubjectResult>, HandlerErr> {
    load_rows(conn, class_name, None)
}

fn load_rows(
    conn: &Connection,
    class_name: &str,
    subject_id: Option<&str>,
) -> Result<Vec<SubjectResult>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT class_name, subject_id, student_id, first_ca, second_ca, exam, total
         FROM subject_results
         WHERE class_name = ?1 AND (?2 IS NULL OR subject_id = ?2)
         ORDER BY subject_id, student_id",
    )?;
    let rows = stmt
        .query_map((class_name, subject_id), |r| {
            Ok(SubjectResult {
                class_name: r.get(0)?,
                subject_id: r.get(1)?,
                student_id: r.get(2)?,
                first_ca: r.get(3)?,
                second_ca: r.get(4)?,
                exam: r.get(5)?,
                total: r.get(6)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn subject_exists(conn: &Connection, subject_id: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn handle_subjects_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare("SELECT id, name, code FROM subjects ORDER BY name, id")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "code": r.get::<_, Option<String>>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "subjects": subjects }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(&req.params, "name")?;
    let code = opt_str(&req.params, "code")?;
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM subjects WHERE lower(name) = lower(?)",
            [&name],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(existing) = taken {
        return Err(HandlerErr::conflict(format!(
            "subject {} already exists as {}",
            name, existing
        )));
    }
    let id = db::new_id("sub");
    conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)",
        (&id, &name, &code),
    )?;
    Ok(json!({ "subjectId": id, "name": name, "code": code }))
}

fn handle_results_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_name = required_str(&req.params, "className")?;
    let subject_id = required_str(&req.params, "subjectId")?;
    if !subject_exists(conn, &subject_id)? {
        return Err(HandlerErr::not_found("Subject not found"));
    }
    let names = student_names(conn, &class_name)?;
    let rows: Vec<serde_json::Value> = load_rows(conn, &class_name, Some(&subject_id))?
        .into_iter()
        .map(|r| {
            let mut v = json!(r);
            v["studentName"] = json!(names.get(&r.student_id));
            v
        })
        .collect();
    Ok(json!({ "className": class_name, "subjectId": subject_id, "rows": rows }))
}

struct ParsedRow {
    student_id: String,
    entry: ScoreEntry,
}

fn parse_rows(params: &serde_json::Value) -> Result<Vec<ParsedRow>, HandlerErr> {
    let arr = params
        .get("rows")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("rows must be an array"))?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(arr.len());
    for (i, raw) in arr.iter().enumerate() {
        if !raw.is_object() {
            return Err(HandlerErr::bad_params(format!("rows[{}] must be an object", i)));
        }
        let student_id = required_str(raw, "studentId")
            .map_err(|e| HandlerErr::bad_params(format!("rows[{}]: {}", i, e)))?;
        if !seen.insert(student_id.clone()) {
            return Err(HandlerErr::bad_params(format!(
                "rows[{}]: student {} appears more than once",
                i, student_id
            )));
        }
        let component = |key: &str| {
            required_f64(raw, key).map_err(|e| HandlerErr::bad_params(format!("rows[{}]: {}", i, e)))
        };
        out.push(ParsedRow {
            student_id,
            entry: ScoreEntry {
                first_ca: component("firstCA")?,
                second_ca: component("secondCA")?,
                exam: component("exam")?,
            },
        });
    }
    Ok(out)
}

fn handle_results_upsert(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_name = required_str(&req.params, "className")?;
    let subject_id = required_str(&req.params, "subjectId")?;
    if !subject_exists(conn, &subject_id)? {
        return Err(HandlerErr::not_found("Subject not found"));
    }
    let max = load_component_max(conn)?;
    let rows = parse_rows(&req.params)?;

    for row in &rows {
        let class_of: Option<String> = conn
            .query_row(
                "SELECT class_name FROM students WHERE id = ?",
                [&row.student_id],
                |r| r.get(0),
            )
            .optional()?;
        match class_of {
            None => {
                return Err(HandlerErr::not_found(format!(
                    "Student not found: {}",
                    row.student_id
                )))
            }
            Some(c) if c != class_name => {
                return Err(HandlerErr::bad_params(format!(
                    "student {} is in {}, not {}",
                    row.student_id, c, class_name
                )))
            }
            Some(_) => {}
        }
        row.entry.validate(&max)?;
    }

    let now = db::now_ts();
    let tx = conn.unchecked_transaction()?;
    let mut saved = Vec::with_capacity(rows.len());
    for row in rows {
        let result = SubjectResult::new(&class_name, &subject_id, &row.student_id, row.entry);
        tx.execute(
            "INSERT INTO subject_results(class_name, subject_id, student_id, first_ca, second_ca, exam, total, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_name, subject_id, student_id) DO UPDATE SET
               first_ca = excluded.first_ca,
               second_ca = excluded.second_ca,
               exam = excluded.exam,
               total = excluded.total,
               updated_at = excluded.updated_at",
            (
                &result.class_name,
                &result.subject_id,
                &result.student_id,
                result.first_ca,
                result.second_ca,
                result.exam,
                result.total,
                &now,
            ),
        )?;
        saved.push(result);
    }
    tx.commit()?;
    tracing::debug!(class = %class_name, subject = %subject_id, rows = saved.len(), "results saved");
    Ok(json!({ "rows": saved }))
}

fn handle_results_class_summary(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_name = required_str(&req.params, "className")?;
    let rows = load_class_rows(conn, &class_name)?;
    let max = load_component_max(conn)?;
    let scale = load_scale(conn)?;
    let aggregate = calc::aggregate_class(&rows, &max, &scale);

    let students = student_names(conn, &class_name)?;
    let subjects = subject_names(conn)?;
    let summaries: Vec<serde_json::Value> = aggregate
        .summaries
        .iter()
        .map(|s| {
            let mut v = json!(s);
            v["studentName"] = json!(students.get(&s.student_id));
            v
        })
        .collect();
    let subject_stats: Vec<serde_json::Value> = aggregate
        .subjects
        .iter()
        .map(|s| {
            let mut v = json!(s);
            v["subjectName"] = json!(subjects.get(&s.subject_id));
            v
        })
        .collect();

    Ok(json!({
        "className": class_name,
        "classSize": aggregate.class_size,
        "classAverage": aggregate.class_average,
        "students": summaries,
        "subjects": subject_stats
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.create" => handle_subjects_create(state, req),
        "results.get" => handle_results_get(state, req),
        "results.upsert" => handle_results_upsert(state, req),
        "results.classSummary" => handle_results_class_summary(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
