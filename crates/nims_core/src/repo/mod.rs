use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::audit::{self, AuditAction};
use crate::domain::{
    BackboneInternetFields, CoreFields, DomainFields, FileAccessFields, Incident, NetworkDomain,
    RadioAccessFields, Responsibility, TransportFields,
};
use crate::error::AppError;
use crate::lifecycle;
use crate::normalize::format_ts;

pub(crate) const INCIDENT_COLUMNS: &str = r#"
  id, domain,
  occurred_at, resolved_at, duration_minutes,
  cause, cause_other, origin, origin_other, impact_comment,
  is_resolved, is_archived, archived_at, archived_by,
  created_by, updated_by, created_at, updated_at,
  region_loop, system_capacity, dot_extremity_a, extremity_a,
  dot_extremity_b, extremity_b, responsibility,
  do_wilaya, zone_metro, site, ip_address,
  platform, region_node,
  interconnect_type, platform_igw, link_label
"#;

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub(crate) fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<Incident> {
    let domain_tag: String = row.get(1)?;
    let domain = NetworkDomain::parse(&domain_tag)
        .ok_or_else(|| conversion_err(1, format!("unknown network domain tag: {domain_tag}")))?;

    let fields = match domain {
        NetworkDomain::Transport => DomainFields::Transport(TransportFields {
            region_loop: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
            system_capacity: row.get::<_, Option<String>>(19)?.unwrap_or_default(),
            dot_extremity_a: row.get(20)?,
            extremity_a: row.get::<_, Option<String>>(21)?.unwrap_or_default(),
            dot_extremity_b: row.get::<_, Option<String>>(22)?.unwrap_or_default(),
            extremity_b: row.get::<_, Option<String>>(23)?.unwrap_or_default(),
            responsibility: row
                .get::<_, Option<String>>(24)?
                .as_deref()
                .and_then(Responsibility::parse),
        }),
        NetworkDomain::FileAccess => DomainFields::FileAccess(FileAccessFields {
            do_wilaya: row.get::<_, Option<String>>(25)?.unwrap_or_default(),
            zone_metro: row.get::<_, Option<String>>(26)?.unwrap_or_default(),
            site: row.get::<_, Option<String>>(27)?.unwrap_or_default(),
            ip_address: row.get::<_, Option<String>>(28)?.unwrap_or_default(),
        }),
        NetworkDomain::RadioAccess => DomainFields::RadioAccess(RadioAccessFields {
            do_wilaya: row.get::<_, Option<String>>(25)?.unwrap_or_default(),
            site: row.get::<_, Option<String>>(27)?.unwrap_or_default(),
            ip_address: row.get::<_, Option<String>>(28)?.unwrap_or_default(),
        }),
        NetworkDomain::Core => DomainFields::Core(CoreFields {
            platform: row.get::<_, Option<String>>(29)?.unwrap_or_default(),
            region_node: row.get::<_, Option<String>>(30)?.unwrap_or_default(),
            site: row.get(27)?,
            dot_extremity_a: row.get(20)?,
            extremity_a: row.get(21)?,
            dot_extremity_b: row.get(22)?,
            extremity_b: row.get(23)?,
        }),
        NetworkDomain::BackboneInternet => DomainFields::BackboneInternet(BackboneInternetFields {
            interconnect_type: row.get::<_, Option<String>>(31)?.unwrap_or_default(),
            platform_igw: row.get::<_, Option<String>>(32)?.unwrap_or_default(),
            link_label: row.get::<_, Option<String>>(33)?.unwrap_or_default(),
        }),
    };

    Ok(Incident {
        id: row.get(0)?,
        occurred_at: row.get(2)?,
        resolved_at: row.get(3)?,
        duration_minutes: row.get(4)?,
        cause: row.get(5)?,
        cause_other: row.get(6)?,
        origin: row.get(7)?,
        origin_other: row.get(8)?,
        impact_comment: row.get(9)?,
        is_resolved: row.get(10)?,
        is_archived: row.get(11)?,
        archived_at: row.get(12)?,
        archived_by: row.get(13)?,
        created_by: row.get(14)?,
        updated_by: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        fields,
    })
}

/// Domain-specific columns flattened for persistence; absent columns stay NULL.
#[derive(Default)]
struct DomainColumns {
    region_loop: Option<String>,
    system_capacity: Option<String>,
    dot_extremity_a: Option<String>,
    extremity_a: Option<String>,
    dot_extremity_b: Option<String>,
    extremity_b: Option<String>,
    responsibility: Option<String>,
    do_wilaya: Option<String>,
    zone_metro: Option<String>,
    site: Option<String>,
    ip_address: Option<String>,
    platform: Option<String>,
    region_node: Option<String>,
    interconnect_type: Option<String>,
    platform_igw: Option<String>,
    link_label: Option<String>,
}

fn domain_columns(fields: &DomainFields) -> DomainColumns {
    match fields {
        DomainFields::Transport(f) => DomainColumns {
            region_loop: Some(f.region_loop.clone()),
            system_capacity: Some(f.system_capacity.clone()),
            dot_extremity_a: f.dot_extremity_a.clone(),
            extremity_a: Some(f.extremity_a.clone()),
            dot_extremity_b: Some(f.dot_extremity_b.clone()),
            extremity_b: Some(f.extremity_b.clone()),
            responsibility: f.responsibility.map(|r| r.as_str().to_string()),
            ..DomainColumns::default()
        },
        DomainFields::FileAccess(f) => DomainColumns {
            do_wilaya: Some(f.do_wilaya.clone()),
            zone_metro: Some(f.zone_metro.clone()),
            site: Some(f.site.clone()),
            ip_address: Some(f.ip_address.clone()),
            ..DomainColumns::default()
        },
        DomainFields::RadioAccess(f) => DomainColumns {
            do_wilaya: Some(f.do_wilaya.clone()),
            site: Some(f.site.clone()),
            ip_address: Some(f.ip_address.clone()),
            ..DomainColumns::default()
        },
        DomainFields::Core(f) => DomainColumns {
            platform: Some(f.platform.clone()),
            region_node: Some(f.region_node.clone()),
            site: f.site.clone(),
            dot_extremity_a: f.dot_extremity_a.clone(),
            extremity_a: f.extremity_a.clone(),
            dot_extremity_b: f.dot_extremity_b.clone(),
            extremity_b: f.extremity_b.clone(),
            ..DomainColumns::default()
        },
        DomainFields::BackboneInternet(f) => DomainColumns {
            interconnect_type: Some(f.interconnect_type.clone()),
            platform_igw: Some(f.platform_igw.clone()),
            link_label: Some(f.link_label.clone()),
            ..DomainColumns::default()
        },
    }
}

pub fn get_incident(conn: &Connection, id: &str) -> Result<Incident, AppError> {
    let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1");
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to prepare incident query")
            .with_details(e.to_string())
    })?;

    stmt.query_row([id], incident_from_row)
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode incident row")
                .with_details(e.to_string())
        })?
        .ok_or_else(|| AppError::new("DB_NOT_FOUND", "Incident not found").with_details(id.to_string()))
}

pub(crate) fn select_incidents(
    conn: &Connection,
    where_sql: &str,
    order_sql: &str,
    limit_sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Incident>, AppError> {
    let sql = format!(
        "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE {where_sql} {order_sql} {limit_sql}"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to prepare incidents query")
            .with_details(e.to_string())
    })?;

    let rows = stmt.query_map(params, incident_from_row).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to query incidents").with_details(e.to_string())
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode incident row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

pub(crate) fn count_where(
    conn: &Connection,
    where_sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM incidents WHERE {where_sql}");
    conn.query_row(&sql, params, |row| row.get(0)).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to count incidents").with_details(e.to_string())
    })
}

pub fn count_incidents(conn: &Connection, domain: Option<NetworkDomain>) -> Result<i64, AppError> {
    match domain {
        Some(d) => count_where(conn, "domain = ?1", &[&d.as_str()]),
        None => count_where(conn, "1=1", &[]),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedIncident {
    pub incident: Incident,
    /// Whether the record meets every archival precondition as of `now`.
    /// Callers (and the periodic sweep) decide what to do with this; saving
    /// never archives implicitly.
    pub archive_eligible: bool,
}

/// Persist a record, running the save sequence as explicit steps:
/// recompute derived fields, upsert, write the audit entry, then report
/// archival eligibility back to the caller.
pub fn save_incident(
    conn: &Connection,
    mut incident: Incident,
    actor: Option<&str>,
    now: OffsetDateTime,
) -> Result<SavedIncident, AppError> {
    // Step 1: derived columns are never trusted from the caller.
    lifecycle::apply_derived_fields(&mut incident, now);

    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM incidents WHERE id = ?1",
            [&incident.id],
            |_| Ok(true),
        )
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to check incident existence")
                .with_details(e.to_string())
        })?
        .unwrap_or(false);

    let stamp = format_ts(now);
    if !exists {
        incident.created_at = stamp.clone();
    } else if incident.created_at.is_empty() {
        // Defensive: an update should always carry its original created_at.
        incident.created_at = stamp.clone();
    }
    incident.updated_at = stamp;
    if let Some(actor) = actor {
        if exists {
            incident.updated_by = Some(actor.to_string());
        } else if incident.created_by.is_none() {
            incident.created_by = Some(actor.to_string());
        }
    }

    // Step 2: upsert.
    let cols = domain_columns(&incident.fields);
    let sql = if exists {
        r#"
      UPDATE incidents SET
        domain = ?2,
        occurred_at = ?3, resolved_at = ?4, duration_minutes = ?5,
        cause = ?6, cause_other = ?7, origin = ?8, origin_other = ?9, impact_comment = ?10,
        is_resolved = ?11, is_archived = ?12, archived_at = ?13, archived_by = ?14,
        created_by = ?15, updated_by = ?16, created_at = ?17, updated_at = ?18,
        region_loop = ?19, system_capacity = ?20, dot_extremity_a = ?21, extremity_a = ?22,
        dot_extremity_b = ?23, extremity_b = ?24, responsibility = ?25,
        do_wilaya = ?26, zone_metro = ?27, site = ?28, ip_address = ?29,
        platform = ?30, region_node = ?31,
        interconnect_type = ?32, platform_igw = ?33, link_label = ?34
      WHERE id = ?1
      "#
    } else {
        r#"
      INSERT INTO incidents (
        id, domain,
        occurred_at, resolved_at, duration_minutes,
        cause, cause_other, origin, origin_other, impact_comment,
        is_resolved, is_archived, archived_at, archived_by,
        created_by, updated_by, created_at, updated_at,
        region_loop, system_capacity, dot_extremity_a, extremity_a,
        dot_extremity_b, extremity_b, responsibility,
        do_wilaya, zone_metro, site, ip_address,
        platform, region_node,
        interconnect_type, platform_igw, link_label
      ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
        ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32,
        ?33, ?34
      )
      "#
    };

    conn.execute(
        sql,
        rusqlite::params![
            incident.id,
            incident.domain().as_str(),
            incident.occurred_at,
            incident.resolved_at,
            incident.duration_minutes,
            incident.cause,
            incident.cause_other,
            incident.origin,
            incident.origin_other,
            incident.impact_comment,
            incident.is_resolved,
            incident.is_archived,
            incident.archived_at,
            incident.archived_by,
            incident.created_by,
            incident.updated_by,
            incident.created_at,
            incident.updated_at,
            cols.region_loop,
            cols.system_capacity,
            cols.dot_extremity_a,
            cols.extremity_a,
            cols.dot_extremity_b,
            cols.extremity_b,
            cols.responsibility,
            cols.do_wilaya,
            cols.zone_metro,
            cols.site,
            cols.ip_address,
            cols.platform,
            cols.region_node,
            cols.interconnect_type,
            cols.platform_igw,
            cols.link_label,
        ],
    )
    .map_err(|e| {
        AppError::new("DB_WRITE_FAILED", "Failed to persist incident").with_details(e.to_string())
    })?;

    // Step 3: audit entry.
    let action = if exists {
        AuditAction::Update
    } else {
        AuditAction::Create
    };
    let changes = serde_json::json!({
        "is_resolved": incident.is_resolved,
        "is_archived": incident.is_archived,
        "duration_minutes": incident.duration_minutes,
    });
    audit::record(
        conn,
        actor,
        action,
        "incident",
        Some(&incident.id),
        Some(&changes),
        now,
    )?;

    // Step 4: eligibility, reported but never acted on here.
    let archive_eligible = lifecycle::can_archive(&incident, now);
    Ok(SavedIncident {
        incident,
        archive_eligible,
    })
}

/// Write archival marks with a compare-and-swap on the archived flag.
/// A zero-row update means another writer archived the record first; the
/// caller treats that as this record's individual failure.
pub fn persist_archival(
    conn: &Connection,
    incident: &Incident,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    let changed = conn
        .execute(
            r#"
      UPDATE incidents
      SET is_archived = 1, archived_at = ?2, archived_by = ?3,
          updated_by = ?3, updated_at = ?4
      WHERE id = ?1 AND is_archived = 0
      "#,
            rusqlite::params![
                incident.id,
                incident.archived_at,
                incident.archived_by,
                format_ts(now)
            ],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to persist archival")
                .with_details(e.to_string())
        })?;

    if changed == 0 {
        return Err(AppError::new(
            "DB_WRITE_CONFLICT",
            "Incident was archived concurrently",
        )
        .with_details(incident.id.clone())
        .with_retryable(true));
    }

    let changes = serde_json::json!({ "is_archived": true });
    audit::record(
        conn,
        incident.archived_by.as_deref(),
        AuditAction::Update,
        "incident",
        Some(&incident.id),
        Some(&changes),
        now,
    )
}

/// Clear archival marks with a compare-and-swap on the archived flag.
pub fn persist_restore(
    conn: &Connection,
    incident: &Incident,
    actor: &str,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    let changed = conn
        .execute(
            r#"
      UPDATE incidents
      SET is_archived = 0, archived_at = NULL, archived_by = NULL,
          updated_by = ?2, updated_at = ?3
      WHERE id = ?1 AND is_archived = 1
      "#,
            rusqlite::params![incident.id, actor, format_ts(now)],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to persist restore")
                .with_details(e.to_string())
        })?;

    if changed == 0 {
        return Err(AppError::new(
            "DB_WRITE_CONFLICT",
            "Incident was restored concurrently",
        )
        .with_details(incident.id.clone())
        .with_retryable(true));
    }

    let changes = serde_json::json!({ "is_archived": false });
    audit::record(
        conn,
        Some(actor),
        AuditAction::Update,
        "incident",
        Some(&incident.id),
        Some(&changes),
        now,
    )
}

/// Cheap SQL pre-filter for the archival sweep: resolved, unarchived, with
/// cause and origin filled. The sweeper re-validates each candidate with the
/// full `can_archive` check, so this filter only has to be a superset.
pub fn archival_candidates(
    conn: &Connection,
    domain: NetworkDomain,
) -> Result<Vec<Incident>, AppError> {
    select_incidents(
        conn,
        "domain = ?1 AND is_resolved = 1 AND is_archived = 0 \
         AND resolved_at IS NOT NULL \
         AND TRIM(COALESCE(cause, '')) <> '' \
         AND TRIM(COALESCE(origin, '')) <> ''",
        "ORDER BY resolved_at ASC, id ASC",
        "",
        &[&domain.as_str()],
    )
}

pub fn delete_incident(
    conn: &Connection,
    id: &str,
    actor: Option<&str>,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    let incident = get_incident(conn, id)?;
    conn.execute("DELETE FROM incidents WHERE id = ?1", [id])
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to delete incident")
                .with_details(e.to_string())
        })?;
    let changes = serde_json::json!({ "domain": incident.domain().as_str() });
    audit::record(
        conn,
        actor,
        AuditAction::Delete,
        "incident",
        Some(id),
        Some(&changes),
        now,
    )
}
