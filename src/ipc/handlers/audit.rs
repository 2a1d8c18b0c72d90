use crate::audit;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{db_conn, opt_i64};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

fn handle_audit_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let limit = opt_i64(&req.params, "limit")?.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(HandlerErr::bad_params(format!(
            "limit must be in 1..={}",
            MAX_LIMIT
        )));
    }
    let entries = audit::list(conn, limit as usize)?;
    Ok(json!({ "entries": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "audit.list" => handle_audit_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
