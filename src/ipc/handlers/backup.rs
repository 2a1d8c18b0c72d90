use crate::backup;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

use super::core::open_workspace;

fn current_workspace(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state.workspace.clone().ok_or(HandlerErr::NoWorkspace)
}

fn handle_export(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let workspace = current_workspace(state)?;
    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }
    let export = backup::export_workspace_bundle(&workspace, &out_path)
        .map_err(|e| HandlerErr::failed("io_failed", e))?;
    tracing::info!(path = %out_path.display(), sha256 = %export.db_sha256, "workspace exported");
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256
    }))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(required_str(&req.params, "inPath")?);
    let workspace = current_workspace(state)?;
    if !in_path.is_file() {
        return Err(HandlerErr::not_found(format!(
            "bundle file not found: {}",
            in_path.to_string_lossy()
        )));
    }

    // The database file is replaced underneath; release the handle first.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = open_workspace(state, &workspace);

    let import = imported.map_err(|e| HandlerErr::failed("io_failed", e))?;
    reopened.map_err(|e| HandlerErr::failed("db_open_failed", e))?;
    tracing::info!(path = %in_path.display(), sha256 = %import.db_sha256, "workspace imported");
    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormat": import.bundle_format,
        "dbSha256": import.db_sha256
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.export" => handle_export(state, req),
        "backup.import" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
