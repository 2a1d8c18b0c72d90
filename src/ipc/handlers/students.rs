use crate::audit;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn, opt_str, patch_obj, required_str};
use crate::ipc::types::{AppState, Request};
use crate::promotion::{self, PromotionMap, PromotionTarget};
use crate::records::{Student, StudentStatus, STUDENT_COLUMNS};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;

pub fn load_student(conn: &Connection, student_id: &str) -> Result<Student, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [student_id],
        Student::from_row,
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("Student not found"))
}

pub fn insert_student(conn: &Connection, s: &Student) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO students(id, name, class_name, status, guardian_name, guardian_phone, guardian_email, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.name,
            &s.class_name,
            s.status.as_str(),
            &s.guardian_name,
            &s.guardian_phone,
            &s.guardian_email,
            &s.created_at,
            &s.updated_at,
        ),
    )?;
    Ok(())
}

fn save_student(conn: &Connection, s: &Student) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE students
         SET name = ?, class_name = ?, status = ?, guardian_name = ?, guardian_phone = ?,
             guardian_email = ?, updated_at = ?
         WHERE id = ?",
        (
            &s.name,
            &s.class_name,
            s.status.as_str(),
            &s.guardian_name,
            &s.guardian_phone,
            &s.guardian_email,
            &s.updated_at,
            &s.id,
        ),
    )?;
    Ok(())
}

fn parse_status(raw: &str) -> Result<StudentStatus, HandlerErr> {
    StudentStatus::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be one of: Active, Alumni"))
}

pub fn list_students(
    conn: &Connection,
    class_name: Option<&str>,
    status: Option<StudentStatus>,
) -> Result<Vec<Student>, HandlerErr> {
    let mut sql = format!("SELECT {} FROM students WHERE 1 = 1", STUDENT_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(c) = class_name {
        sql.push_str(" AND class_name = ?");
        bind.push(Value::Text(c.to_string()));
    }
    if let Some(s) = status {
        sql.push_str(" AND status = ?");
        bind.push(Value::Text(s.as_str().to_string()));
    }
    sql.push_str(" ORDER BY class_name, name, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), Student::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_name = opt_str(&req.params, "className")?;
    let status = opt_str(&req.params, "status")?
        .map(|s| parse_status(&s))
        .transpose()?;
    let students = list_students(conn, class_name.as_deref(), status)?;
    Ok(json!({ "students": students }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    Ok(json!({ "student": load_student(conn, &student_id)? }))
}

fn handle_students_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student = Student {
        id: db::new_id("stu"),
        name: required_str(&req.params, "name")?,
        class_name: required_str(&req.params, "className")?,
        status: StudentStatus::Active,
        guardian_name: opt_str(&req.params, "guardianName")?,
        guardian_phone: opt_str(&req.params, "guardianPhone")?,
        guardian_email: opt_str(&req.params, "guardianEmail")?,
        created_at: db::now_ts(),
        updated_at: None,
    };
    insert_student(conn, &student)?;
    Ok(json!({ "student": student }))
}

fn handle_students_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let patch = patch_obj(&req.params)?;
    let mut student = load_student(conn, &student_id)?;

    let patch_value = serde_json::Value::Object(patch.clone());
    for key in patch.keys() {
        match key.as_str() {
            "name" => student.name = required_str(&patch_value, "name")?,
            "className" => student.class_name = required_str(&patch_value, "className")?,
            "guardianName" => student.guardian_name = opt_str(&patch_value, "guardianName")?,
            "guardianPhone" => student.guardian_phone = opt_str(&patch_value, "guardianPhone")?,
            "guardianEmail" => student.guardian_email = opt_str(&patch_value, "guardianEmail")?,
            "status" => {
                return Err(HandlerErr::bad_params(
                    "use students.setStatus to change status",
                ))
            }
            other => return Err(HandlerErr::bad_params(format!("unknown student field: {}", other))),
        }
    }
    student.updated_at = Some(db::now_ts());
    save_student(conn, &student)?;
    Ok(json!({ "student": student }))
}

fn handle_students_set_status(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let status = parse_status(&required_str(&req.params, "status")?)?;
    let actor = actor(&req.params)?;
    let mut student = load_student(conn, &student_id)?;
    if student.status == status {
        return Ok(json!({ "student": student, "changed": false }));
    }

    let previous = student.status;
    student.status = status;
    student.updated_at = Some(db::now_ts());
    let tx = conn.unchecked_transaction()?;
    save_student(&tx, &student)?;
    audit::append(
        &tx,
        &actor,
        "students.setStatus",
        format!(
            "{} ({}): {} -> {}",
            student.name,
            student.id,
            previous.as_str(),
            status.as_str()
        ),
    )?;
    tx.commit()?;
    Ok(json!({ "student": student, "changed": true }))
}

fn handle_students_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let actor = actor(&req.params)?;
    let student = load_student(conn, &student_id)?;

    let invoice_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM invoices WHERE student_id = ?",
        [&student_id],
        |r| r.get(0),
    )?;
    if invoice_count > 0 {
        return Err(HandlerErr::conflict(
            "student has invoices; change status instead of deleting",
        ));
    }

    // Explicit dependency order; there is no ON DELETE CASCADE.
    let tx = conn.unchecked_transaction()?;
    let results = tx.execute(
        "DELETE FROM subject_results WHERE student_id = ?",
        [&student_id],
    )?;
    tx.execute(
        "DELETE FROM student_ratings WHERE student_id = ?",
        [&student_id],
    )?;
    tx.execute("DELETE FROM report_meta WHERE student_id = ?", [&student_id])?;
    tx.execute(
        "UPDATE admissions SET student_id = NULL WHERE student_id = ?",
        [&student_id],
    )?;
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])?;
    audit::append(
        &tx,
        &actor,
        "students.delete",
        format!("{} ({}), {} result rows removed", student.name, student.id, results),
    )?;
    tx.commit()?;
    Ok(json!({ "deleted": true, "resultRowsRemoved": results }))
}

fn parse_promotion_map(params: &serde_json::Value) -> Result<PromotionMap, HandlerErr> {
    let obj = params
        .get("promotions")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("promotions must be an object"))?;
    let mut map = PromotionMap::new();
    for (from, to) in obj {
        let to = to.as_str().ok_or_else(|| {
            HandlerErr::bad_params(format!("promotions.{} must be a string", from))
        })?;
        let target = PromotionTarget::parse(to).ok_or_else(|| {
            HandlerErr::bad_params(format!("promotions.{} must not be empty", from))
        })?;
        map.insert(from.trim().to_string(), target);
    }
    Ok(map)
}

fn handle_students_promote(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let map = parse_promotion_map(&req.params)?;
    let actor = actor(&req.params)?;

    let mut students = list_students(conn, None, Some(StudentStatus::Active))?;
    let outcome = promotion::apply_promotions(&mut students, &map);

    let now = db::now_ts();
    let tx = conn.unchecked_transaction()?;
    let mut changed = Vec::with_capacity(outcome.changed.len());
    for &i in &outcome.changed {
        let student = &mut students[i];
        student.updated_at = Some(now.clone());
        save_student(&tx, student)?;
        changed.push(student.clone());
    }
    audit::append(
        &tx,
        &actor,
        "students.promote",
        format!(
            "promoted {}, graduated {}, unchanged {}",
            outcome.promoted_count, outcome.graduated_count, outcome.unchanged_count
        ),
    )?;
    tx.commit()?;

    tracing::info!(
        promoted = outcome.promoted_count,
        graduated = outcome.graduated_count,
        "promotion batch applied"
    );
    Ok(json!({
        "promotedCount": outcome.promoted_count,
        "graduatedCount": outcome.graduated_count,
        "unchangedCount": outcome.unchanged_count,
        "students": changed
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.setStatus" => handle_students_set_status(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.promote" => handle_students_promote(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
