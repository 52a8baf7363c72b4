use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::normalize::format_ts;

/// Actions recorded in the audit trail. Written explicitly by the save/delete
/// glue as a visible step, never from a framework hook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Export,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Export => "EXPORT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: Option<String>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<String>,
    pub changes_json: Option<String>,
    pub recorded_at: String,
}

pub fn record(
    conn: &Connection,
    actor: Option<&str>,
    action: AuditAction,
    entity: &str,
    entity_id: Option<&str>,
    changes: Option<&serde_json::Value>,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    let changes_json = changes.map(|c| c.to_string());
    conn.execute(
        r#"
      INSERT INTO audit_log (actor, action, entity, entity_id, changes_json, recorded_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6)
      "#,
        rusqlite::params![
            actor,
            action.as_str(),
            entity,
            entity_id,
            changes_json,
            format_ts(now)
        ],
    )
    .map_err(|e| {
        AppError::new("DB_WRITE_FAILED", "Failed to write audit entry")
            .with_details(e.to_string())
    })?;
    Ok(())
}

/// Most recent entries, newest first (id breaks same-second ties).
pub fn recent(conn: &Connection, limit: i64) -> Result<Vec<AuditEntry>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, actor, action, entity, entity_id, changes_json, recorded_at
      FROM audit_log
      ORDER BY recorded_at DESC, id DESC
      LIMIT ?1
      "#,
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare audit query")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map([limit], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                actor: row.get(1)?,
                action: row.get(2)?,
                entity: row.get(3)?,
                entity_id: row.get(4)?,
                changes_json: row.get(5)?,
                recorded_at: row.get(6)?,
            })
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query audit log")
                .with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode audit row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}
