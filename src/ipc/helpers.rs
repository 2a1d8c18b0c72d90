use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use rusqlite::Connection;
use serde_json::Value;

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or(HandlerErr::NoWorkspace)
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all read as `None`; any other non-string is an error.
pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key)))?
                .trim()
                .to_string();
            Ok(if s.is_empty() { None } else { Some(s) })
        }
    }
}

pub fn required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    match params.get(key) {
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    match params.get(key) {
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn opt_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer or null", key))),
    }
}

pub fn patch_obj<'a>(
    params: &'a Value,
) -> Result<&'a serde_json::Map<String, Value>, HandlerErr> {
    params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))
}

pub fn actor(params: &Value) -> Result<String, HandlerErr> {
    Ok(opt_str(params, "actor")?.unwrap_or_else(|| "system".to_string()))
}
