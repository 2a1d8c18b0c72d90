use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{db_conn, opt_str, patch_obj, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{Staff, StaffStatus, STAFF_COLUMNS};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;

fn load_staff(conn: &Connection, staff_id: &str) -> Result<Staff, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM staff WHERE id = ?", STAFF_COLUMNS),
        [staff_id],
        Staff::from_row,
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("Staff member not found"))
}

pub fn list_staff(conn: &Connection, status: Option<StaffStatus>) -> Result<Vec<Staff>, HandlerErr> {
    let mut sql = format!("SELECT {} FROM staff", STAFF_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(s) = status {
        sql.push_str(" WHERE status = ?");
        bind.push(Value::Text(s.as_str().to_string()));
    }
    sql.push_str(" ORDER BY name, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), Staff::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn parse_status(raw: &str) -> Result<StaffStatus, HandlerErr> {
    StaffStatus::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be one of: Active, Inactive"))
}

fn parse_salary(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let salary = required_i64(params, "salary")?;
    if salary < 0 {
        return Err(HandlerErr::bad_params("salary must not be negative"));
    }
    Ok(salary)
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let status = opt_str(&req.params, "status")?
        .map(|s| parse_status(&s))
        .transpose()?;
    Ok(json!({ "staff": list_staff(conn, status)? }))
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let staff = Staff {
        id: db::new_id("stf"),
        name: required_str(&req.params, "name")?,
        role: required_str(&req.params, "role")?,
        salary: parse_salary(&req.params)?,
        status: opt_str(&req.params, "status")?
            .map(|s| parse_status(&s))
            .transpose()?
            .unwrap_or(StaffStatus::Active),
        created_at: db::now_ts(),
    };
    conn.execute(
        "INSERT INTO staff(id, name, role, salary, status, created_at) VALUES(?, ?, ?, ?, ?, ?)",
        (
            &staff.id,
            &staff.name,
            &staff.role,
            staff.salary,
            staff.status.as_str(),
            &staff.created_at,
        ),
    )?;
    Ok(json!({ "staff": staff }))
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let staff_id = required_str(&req.params, "staffId")?;
    let patch = patch_obj(&req.params)?;
    let mut staff = load_staff(conn, &staff_id)?;

    let patch_value = serde_json::Value::Object(patch.clone());
    for key in patch.keys() {
        match key.as_str() {
            "name" => staff.name = required_str(&patch_value, "name")?,
            "role" => staff.role = required_str(&patch_value, "role")?,
            "salary" => staff.salary = parse_salary(&patch_value)?,
            "status" => staff.status = parse_status(&required_str(&patch_value, "status")?)?,
            other => return Err(HandlerErr::bad_params(format!("unknown staff field: {}", other))),
        }
    }
    conn.execute(
        "UPDATE staff SET name = ?, role = ?, salary = ?, status = ? WHERE id = ?",
        (
            &staff.name,
            &staff.role,
            staff.salary,
            staff.status.as_str(),
            &staff.id,
        ),
    )?;
    Ok(json!({ "staff": staff }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "staff.list" => handle_staff_list(state, req),
        "staff.create" => handle_staff_create(state, req),
        "staff.update" => handle_staff_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
