use crate::audit;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{Student, StudentStatus};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;

use super::students::insert_student;

const STATUS_PENDING: &str = "Pending";
const STATUS_ADMITTED: &str = "Admitted";
const STATUS_REJECTED: &str = "Rejected";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Admission {
    id: String,
    applicant_name: String,
    desired_class: String,
    guardian_name: Option<String>,
    guardian_phone: Option<String>,
    guardian_email: Option<String>,
    status: String,
    student_id: Option<String>,
    created_at: String,
}

const ADMISSION_COLUMNS: &str = "id, applicant_name, desired_class, guardian_name, guardian_phone, guardian_email, status, student_id, created_at";

impl Admission {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            applicant_name: r.get(1)?,
            desired_class: r.get(2)?,
            guardian_name: r.get(3)?,
            guardian_phone: r.get(4)?,
            guardian_email: r.get(5)?,
            status: r.get(6)?,
            student_id: r.get(7)?,
            created_at: r.get(8)?,
        })
    }
}

fn load_admission(conn: &Connection, id: &str) -> Result<Admission, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM admissions WHERE id = ?", ADMISSION_COLUMNS),
        [id],
        Admission::from_row,
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("Admission not found"))
}

fn canonical_status(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(STATUS_PENDING),
        "admitted" => Ok(STATUS_ADMITTED),
        "rejected" => Ok(STATUS_REJECTED),
        _ => Err(HandlerErr::bad_params(
            "status must be one of: Pending, Admitted, Rejected",
        )),
    }
}

fn handle_admissions_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut sql = format!("SELECT {} FROM admissions", ADMISSION_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(s) = opt_str(&req.params, "status")? {
        sql.push_str(" WHERE status = ?");
        bind.push(Value::Text(canonical_status(&s)?.to_string()));
    }
    sql.push_str(" ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let admissions = stmt
        .query_map(params_from_iter(bind), Admission::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "admissions": admissions }))
}

fn handle_admissions_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let admission = Admission {
        id: db::new_id("adm"),
        applicant_name: required_str(&req.params, "applicantName")?,
        desired_class: required_str(&req.params, "desiredClass")?,
        guardian_name: opt_str(&req.params, "guardianName")?,
        guardian_phone: opt_str(&req.params, "guardianPhone")?,
        guardian_email: opt_str(&req.params, "guardianEmail")?,
        status: STATUS_PENDING.to_string(),
        student_id: None,
        created_at: db::now_ts(),
    };
    conn.execute(
        "INSERT INTO admissions(id, applicant_name, desired_class, guardian_name, guardian_phone, guardian_email, status, student_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &admission.id,
            &admission.applicant_name,
            &admission.desired_class,
            &admission.guardian_name,
            &admission.guardian_phone,
            &admission.guardian_email,
            &admission.status,
            &admission.student_id,
            &admission.created_at,
        ),
    )?;
    Ok(json!({ "admission": admission }))
}

fn handle_admissions_reject(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "admissionId")?;
    let actor = actor(&req.params)?;
    let mut admission = load_admission(conn, &id)?;
    if admission.status != STATUS_PENDING {
        return Err(HandlerErr::conflict(format!(
            "admission is already {}",
            admission.status
        )));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE admissions SET status = ? WHERE id = ?",
        (STATUS_REJECTED, &id),
    )?;
    audit::append(
        &tx,
        &actor,
        "admissions.reject",
        format!("{} ({})", admission.applicant_name, admission.id),
    )?;
    tx.commit()?;
    admission.status = STATUS_REJECTED.to_string();
    Ok(json!({ "admission": admission }))
}

fn handle_admissions_convert(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "admissionId")?;
    let actor = actor(&req.params)?;
    let mut admission = load_admission(conn, &id)?;
    if admission.status != STATUS_PENDING {
        return Err(HandlerErr::conflict(format!(
            "admission is already {}",
            admission.status
        )));
    }
    let class_name = opt_str(&req.params, "className")?
        .unwrap_or_else(|| admission.desired_class.clone());

    let student = Student {
        id: db::new_id("stu"),
        name: admission.applicant_name.clone(),
        class_name,
        status: StudentStatus::Active,
        guardian_name: admission.guardian_name.clone(),
        guardian_phone: admission.guardian_phone.clone(),
        guardian_email: admission.guardian_email.clone(),
        created_at: db::now_ts(),
        updated_at: None,
    };

    let tx = conn.unchecked_transaction()?;
    insert_student(&tx, &student)?;
    tx.execute(
        "UPDATE admissions SET status = ?, student_id = ? WHERE id = ?",
        (STATUS_ADMITTED, &student.id, &id),
    )?;
    audit::append(
        &tx,
        &actor,
        "admissions.convert",
        format!(
            "{} ({}) admitted into {} as {}",
            admission.applicant_name, admission.id, student.class_name, student.id
        ),
    )?;
    tx.commit()?;

    admission.status = STATUS_ADMITTED.to_string();
    admission.student_id = Some(student.id.clone());
    Ok(json!({ "admission": admission, "student": student }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admissions.list" => handle_admissions_list(state, req),
        "admissions.create" => handle_admissions_create(state, req),
        "admissions.reject" => handle_admissions_reject(state, req),
        "admissions.convert" => handle_admissions_convert(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
