use crate::db;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub details: String,
    pub timestamp: String,
}

/// Append-only; nothing updates or deletes audit rows.
pub fn append(
    conn: &Connection,
    actor: &str,
    action: &str,
    details: impl Into<String>,
) -> rusqlite::Result<AuditEntry> {
    let entry = AuditEntry {
        id: db::new_id("aud"),
        actor: actor.to_string(),
        action: action.to_string(),
        details: details.into(),
        timestamp: db::now_ts(),
    };
    conn.execute(
        "INSERT INTO audit_log(id, actor, action, details, created_at) VALUES(?, ?, ?, ?, ?)",
        (
            &entry.id,
            &entry.actor,
            &entry.action,
            &entry.details,
            &entry.timestamp,
        ),
    )?;
    tracing::debug!(action = %entry.action, actor = %entry.actor, "audit entry appended");
    Ok(entry)
}

/// Newest first.
pub fn list(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, actor, action, details, created_at
         FROM audit_log
         ORDER BY seq DESC
         LIMIT ?",
    )?;
    stmt.query_map([limit as i64], |r| {
        Ok(AuditEntry {
            id: r.get(0)?,
            actor: r.get(1)?,
            action: r.get(2)?,
            details: r.get(3)?,
            timestamp: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}
