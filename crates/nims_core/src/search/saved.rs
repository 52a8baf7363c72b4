use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::NetworkDomain;
use crate::error::AppError;
use crate::normalize::format_ts;
use crate::search::SearchParams;

/// A persisted search preference. The parameter bag is stored as opaque JSON
/// and only interpreted when the owner runs it again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedSearch {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub domain: String,
    pub params_json: String,
    pub is_default: bool,
    pub use_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl SavedSearch {
    /// Decode the parameter bag. Unknown fields are ignored so old saved
    /// searches keep loading after the param set grows.
    pub fn search_params(&self) -> Result<SearchParams, AppError> {
        serde_json::from_str(&self.params_json).map_err(|e| {
            AppError::new("SAVED_SEARCH_DECODE_FAILED", "Saved search parameters are corrupted")
                .with_details(e.to_string())
        })
    }
}

fn row_to_saved(row: &rusqlite::Row<'_>) -> rusqlite::Result<SavedSearch> {
    Ok(SavedSearch {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        domain: row.get(3)?,
        params_json: row.get(4)?,
        is_default: row.get(5)?,
        use_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const SAVED_COLUMNS: &str =
    "id, owner, name, domain, params_json, is_default, use_count, created_at, updated_at";

/// Create or update a saved search, keyed by `(owner, domain, name)`.
/// Marking one as default clears the owner's previous default for the domain.
pub fn save_search(
    conn: &Connection,
    owner: &str,
    name: &str,
    domain: NetworkDomain,
    params: &SearchParams,
    is_default: bool,
    now: OffsetDateTime,
) -> Result<SavedSearch, AppError> {
    let params_json = serde_json::to_string(params).map_err(|e| {
        AppError::new("SAVED_SEARCH_ENCODE_FAILED", "Failed to encode search parameters")
            .with_details(e.to_string())
    })?;
    let stamp = format_ts(now);

    if is_default {
        conn.execute(
            "UPDATE saved_searches SET is_default = 0 WHERE owner = ?1 AND domain = ?2",
            rusqlite::params![owner, domain.as_str()],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to clear previous default search")
                .with_details(e.to_string())
        })?;
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM saved_searches WHERE owner = ?1 AND domain = ?2 AND name = ?3",
            rusqlite::params![owner, domain.as_str(), name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to look up saved search")
                .with_details(e.to_string())
        })?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE saved_searches SET params_json = ?2, is_default = ?3, updated_at = ?4 \
                 WHERE id = ?1",
                rusqlite::params![id, params_json, is_default, stamp],
            )
            .map_err(|e| {
                AppError::new("DB_WRITE_FAILED", "Failed to update saved search")
                    .with_details(e.to_string())
            })?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO saved_searches \
                 (id, owner, name, domain, params_json, is_default, use_count, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
                rusqlite::params![id, owner, name, domain.as_str(), params_json, is_default, stamp],
            )
            .map_err(|e| {
                AppError::new("DB_WRITE_FAILED", "Failed to insert saved search")
                    .with_details(e.to_string())
            })?;
            id
        }
    };

    get_search(conn, &id)
}

pub fn get_search(conn: &Connection, id: &str) -> Result<SavedSearch, AppError> {
    let sql = format!("SELECT {SAVED_COLUMNS} FROM saved_searches WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_saved)
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query saved search")
                .with_details(e.to_string())
        })?
        .ok_or_else(|| {
            AppError::new("DB_NOT_FOUND", "Saved search not found").with_details(id.to_string())
        })
}

/// Owner's searches for one domain, default first, then most recently updated.
pub fn list_searches(
    conn: &Connection,
    owner: &str,
    domain: NetworkDomain,
) -> Result<Vec<SavedSearch>, AppError> {
    let sql = format!(
        "SELECT {SAVED_COLUMNS} FROM saved_searches \
         WHERE owner = ?1 AND domain = ?2 \
         ORDER BY is_default DESC, updated_at DESC, name ASC"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to prepare saved search query")
            .with_details(e.to_string())
    })?;
    let rows = stmt
        .query_map(rusqlite::params![owner, domain.as_str()], row_to_saved)
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query saved searches")
                .with_details(e.to_string())
        })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode saved search row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

/// Load a saved search for execution, bumping its usage counter.
pub fn load_search(conn: &Connection, id: &str, now: OffsetDateTime) -> Result<SavedSearch, AppError> {
    let search = get_search(conn, id)?;
    conn.execute(
        "UPDATE saved_searches SET use_count = use_count + 1, updated_at = ?2 WHERE id = ?1",
        rusqlite::params![id, format_ts(now)],
    )
    .map_err(|e| {
        AppError::new("DB_WRITE_FAILED", "Failed to record saved search use")
            .with_details(e.to_string())
    })?;
    get_search(conn, &search.id)
}

/// Delete one of the owner's saved searches; someone else's id is NotFound.
pub fn delete_search(conn: &Connection, owner: &str, id: &str) -> Result<(), AppError> {
    let changed = conn
        .execute(
            "DELETE FROM saved_searches WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to delete saved search")
                .with_details(e.to_string())
        })?;
    if changed == 0 {
        return Err(
            AppError::new("DB_NOT_FOUND", "Saved search not found for owner")
                .with_details(id.to_string()),
        );
    }
    Ok(())
}
