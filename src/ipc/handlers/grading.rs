use crate::audit;
use crate::calc::{self, GradeScaleItem};
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn, required_f64};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

const CLEARED_KEY: &str = "grading.scale.cleared";

/// Stored (admin) order.
pub fn load_scale(conn: &Connection) -> Result<Vec<GradeScaleItem>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT grade, range_start, range_end, remark
         FROM grade_scale
         ORDER BY position",
    )?;
    let items = stmt
        .query_map([], |r| {
            Ok(GradeScaleItem {
                grade: r.get(0)?,
                range_start: r.get(1)?,
                range_end: r.get(2)?,
                remark: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(items)
}

fn parse_items(params: &serde_json::Value) -> Result<Vec<GradeScaleItem>, HandlerErr> {
    let raw = params
        .get("items")
        .filter(|v| v.is_array())
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("items must be an array"))?;
    let mut items: Vec<GradeScaleItem> = serde_json::from_value(raw).map_err(|e| {
        HandlerErr::bad_params(format!(
            "items must be objects with grade, rangeStart, rangeEnd, remark: {}",
            e
        ))
    })?;
    for item in items.iter_mut() {
        item.grade = item.grade.trim().to_string();
        item.remark = item.remark.trim().to_string();
        item.validate()?;
    }
    Ok(items)
}

fn handle_scale_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let items = load_scale(conn)?;
    let warnings = calc::scale_warnings(&items);
    Ok(json!({ "items": items, "warnings": warnings }))
}

fn handle_scale_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let items = parse_items(&req.params)?;
    let actor = actor(&req.params)?;
    let warnings = calc::scale_warnings(&items);

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM grade_scale", [])?;
    for (i, item) in items.iter().enumerate() {
        tx.execute(
            "INSERT INTO grade_scale(position, grade, range_start, range_end, remark)
             VALUES(?, ?, ?, ?, ?)",
            (
                i as i64,
                &item.grade,
                item.range_start,
                item.range_end,
                &item.remark,
            ),
        )?;
    }
    let marker = if items.is_empty() {
        db::settings_set_json(&tx, CLEARED_KEY, &json!(true))
    } else {
        db::settings_delete(&tx, CLEARED_KEY)
    };
    marker.map_err(|e| HandlerErr::failed("db_update_failed", e))?;
    audit::append(
        &tx,
        &actor,
        "grading.scale.set",
        format!(
            "{} grades: {}",
            items.len(),
            items
                .iter()
                .map(|i| format!("{} {}-{}", i.grade, i.range_start, i.range_end))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    )?;
    tx.commit()?;

    if !warnings.is_empty() {
        tracing::info!(count = warnings.len(), "grade scale saved with coverage warnings");
    }
    Ok(json!({ "items": items, "warnings": warnings }))
}

fn handle_lookup(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let percentage = required_f64(&req.params, "percentage")?;
    if !(0.0..=100.0).contains(&percentage) {
        return Err(HandlerErr::bad_params("percentage must be in 0..=100"));
    }
    let scale = load_scale(conn)?;
    let pct = calc::round_2dp(percentage);
    let hit = calc::lookup_grade(pct, &scale);
    Ok(json!({
        "percentage": pct,
        "matched": hit.is_some(),
        "grade": hit.map(|g| g.grade.clone()),
        "remark": hit.map(|g| g.remark.clone())
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grading.scale.get" => handle_scale_get(state, req),
        "grading.scale.set" => handle_scale_set(state, req),
        "grading.lookup" => handle_lookup(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
