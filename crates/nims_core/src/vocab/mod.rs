use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::normalize::format_ts;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DropdownEntry {
    pub id: i64,
    pub category: String,
    pub value: String,
    pub is_active: bool,
    pub sort_order: i64,
}

/// Capability handed to whatever layer builds user-facing choice lists.
/// Lifecycle and aggregation logic never needs vocabulary lookups; keeping
/// this behind a trait keeps form construction free of ambient queries.
pub trait VocabularyProvider {
    fn options(&self, category: &str) -> Result<Vec<String>, AppError>;
}

pub struct SqliteVocabulary<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteVocabulary<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl VocabularyProvider for SqliteVocabulary<'_> {
    /// Active values for a category, lowest sort order first, value as the
    /// tie-break (the admin panel's display order).
    fn options(&self, category: &str) -> Result<Vec<String>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT value FROM dropdown_configurations \
                 WHERE category = ?1 AND is_active = 1 \
                 ORDER BY sort_order ASC, value ASC",
            )
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to prepare vocabulary query")
                    .with_details(e.to_string())
            })?;
        let rows = stmt
            .query_map([category], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query vocabulary")
                    .with_details(e.to_string())
            })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to decode vocabulary row")
                    .with_details(e.to_string())
            })?);
        }
        Ok(out)
    }
}

pub fn list_entries(conn: &Connection, category: &str) -> Result<Vec<DropdownEntry>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, category, value, is_active, sort_order \
             FROM dropdown_configurations WHERE category = ?1 \
             ORDER BY sort_order ASC, value ASC",
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare vocabulary query")
                .with_details(e.to_string())
        })?;
    let rows = stmt
        .query_map([category], |row| {
            Ok(DropdownEntry {
                id: row.get(0)?,
                category: row.get(1)?,
                value: row.get(2)?,
                is_active: row.get(3)?,
                sort_order: row.get(4)?,
            })
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query vocabulary entries")
                .with_details(e.to_string())
        })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode vocabulary entry")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Get-or-create semantics: inserts a missing `(category, value)` pair, or
/// realigns the sort order of an existing one.
pub fn upsert_entry(
    conn: &Connection,
    category: &str,
    value: &str,
    sort_order: i64,
    now: OffsetDateTime,
) -> Result<UpsertOutcome, AppError> {
    let existing: Option<(i64, i64)> = conn
        .query_row(
            "SELECT id, sort_order FROM dropdown_configurations \
             WHERE category = ?1 AND value = ?2",
            rusqlite::params![category, value],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to look up vocabulary entry")
                .with_details(e.to_string())
        })?;

    let stamp = format_ts(now);
    match existing {
        None => {
            conn.execute(
                "INSERT INTO dropdown_configurations \
                 (category, value, is_active, sort_order, created_at, updated_at) \
                 VALUES (?1, ?2, 1, ?3, ?4, ?4)",
                rusqlite::params![category, value, sort_order, stamp],
            )
            .map_err(|e| {
                AppError::new("DB_WRITE_FAILED", "Failed to insert vocabulary entry")
                    .with_details(e.to_string())
            })?;
            Ok(UpsertOutcome::Created)
        }
        Some((id, current_order)) => {
            if current_order == sort_order {
                return Ok(UpsertOutcome::Unchanged);
            }
            conn.execute(
                "UPDATE dropdown_configurations \
                 SET sort_order = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, sort_order, stamp],
            )
            .map_err(|e| {
                AppError::new("DB_WRITE_FAILED", "Failed to update vocabulary entry")
                    .with_details(e.to_string())
            })?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

/// Deactivate an option without deleting it, so historical records keep
/// their stored value while new forms stop offering it.
pub fn set_active(
    conn: &Connection,
    category: &str,
    value: &str,
    is_active: bool,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    let changed = conn
        .execute(
            "UPDATE dropdown_configurations SET is_active = ?3, updated_at = ?4 \
             WHERE category = ?1 AND value = ?2",
            rusqlite::params![category, value, is_active, format_ts(now)],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to update vocabulary entry")
                .with_details(e.to_string())
        })?;
    if changed == 0 {
        return Err(AppError::new("DB_NOT_FOUND", "Vocabulary entry not found")
            .with_details(format!("{category}: {value}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub created: i64,
    pub updated: i64,
}

/// Baseline vocabulary shipped with the system; safe to re-run (existing
/// entries only have their sort order realigned).
pub fn seed_defaults(conn: &Connection, now: OffsetDateTime) -> Result<SeedSummary, AppError> {
    let mut summary = SeedSummary::default();
    for (category, value, sort_order) in DEFAULT_VOCABULARY {
        match upsert_entry(conn, category, value, *sort_order, now)? {
            UpsertOutcome::Created => summary.created += 1,
            UpsertOutcome::Updated => summary.updated += 1,
            UpsertOutcome::Unchanged => {}
        }
    }
    Ok(summary)
}

const DEFAULT_VOCABULARY: &[(&str, &str, i64)] = &[
    // Common: causes
    ("cause", "Power Failure", 1),
    ("cause", "Fiber Cut", 2),
    ("cause", "Equipment Failure", 3),
    ("cause", "Software Bug", 4),
    ("cause", "Human Error", 5),
    ("cause", "Natural Disaster", 6),
    ("cause", "Planned Maintenance", 7),
    ("cause", "Network Congestion", 8),
    ("cause", "Security Breach", 9),
    ("cause", "Other", 99),
    // Common: origins
    ("origin", "Internal System", 1),
    ("origin", "External Provider", 2),
    ("origin", "Customer Site", 3),
    ("origin", "Data Center", 4),
    ("origin", "Field Equipment", 5),
    ("origin", "Third Party", 6),
    ("origin", "Unknown", 7),
    ("origin", "Other", 99),
    // Transport networks
    ("region_loop", "North Region", 1),
    ("region_loop", "South Region", 2),
    ("region_loop", "East Region", 3),
    ("region_loop", "West Region", 4),
    ("region_loop", "Central Loop", 5),
    ("region_loop", "Metro Loop 1", 6),
    ("region_loop", "Metro Loop 2", 7),
    ("system_capacity", "STM-1 (155 Mbps)", 1),
    ("system_capacity", "STM-4 (622 Mbps)", 2),
    ("system_capacity", "STM-16 (2.5 Gbps)", 3),
    ("system_capacity", "STM-64 (10 Gbps)", 4),
    ("system_capacity", "10GE", 5),
    ("system_capacity", "40GE", 6),
    ("system_capacity", "100GE", 7),
    ("dot_states", "Adrar", 1),
    ("dot_states", "Chlef", 2),
    ("dot_states", "Laghouat", 3),
    ("dot_states", "Oum El Bouaghi", 4),
    ("dot_states", "Batna", 5),
    ("dot_states", "Béjaïa", 6),
    ("dot_states", "Biskra", 7),
    ("dot_states", "Béchar", 8),
    ("dot_states", "Blida", 9),
    ("dot_states", "Bouira", 10),
    ("dot_states", "Tamanrasset", 11),
    ("dot_states", "Tébessa", 12),
    ("dot_states", "Tlemcen", 13),
    ("dot_states", "Tiaret", 14),
    ("dot_states", "Tizi Ouzou", 15),
    ("dot_states", "Alger", 16),
    ("dot_states", "Djelfa", 17),
    ("dot_states", "Jijel", 18),
    ("dot_states", "Sétif", 19),
    ("dot_states", "Saïda", 20),
    // Wilayas for file access and radio access networks
    ("wilayas", "Adrar", 1),
    ("wilayas", "Chlef", 2),
    ("wilayas", "Laghouat", 3),
    ("wilayas", "Oum El Bouaghi", 4),
    ("wilayas", "Batna", 5),
    ("wilayas", "Béjaïa", 6),
    ("wilayas", "Biskra", 7),
    ("wilayas", "Béchar", 8),
    ("wilayas", "Blida", 9),
    ("wilayas", "Bouira", 10),
    ("wilayas", "Tamanrasset", 11),
    ("wilayas", "Tébessa", 12),
    ("wilayas", "Tlemcen", 13),
    ("wilayas", "Tiaret", 14),
    ("wilayas", "Tizi Ouzou", 15),
    ("wilayas", "Alger", 16),
    ("wilayas", "Djelfa", 17),
    ("wilayas", "Jijel", 18),
    ("wilayas", "Sétif", 19),
    ("wilayas", "Saïda", 20),
    ("wilayas", "Skikda", 21),
    ("wilayas", "Sidi Bel Abbès", 22),
    ("wilayas", "Annaba", 23),
    ("wilayas", "Guelma", 24),
    ("wilayas", "Constantine", 25),
    ("wilayas", "Médéa", 26),
    ("wilayas", "Mostaganem", 27),
    ("wilayas", "MSila", 28),
    ("wilayas", "Mascara", 29),
    ("wilayas", "Ouargla", 30),
    ("wilayas", "Oran", 31),
    ("wilayas", "El Bayadh", 32),
    ("wilayas", "Illizi", 33),
    ("wilayas", "Bordj Bou Arréridj", 34),
    ("wilayas", "Boumerdès", 35),
    ("wilayas", "El Tarf", 36),
    ("wilayas", "Tindouf", 37),
    ("wilayas", "Tissemsilt", 38),
    ("wilayas", "El Oued", 39),
    ("wilayas", "Khenchela", 40),
    ("wilayas", "Souk Ahras", 41),
    ("wilayas", "Tipaza", 42),
    ("wilayas", "Mila", 43),
    ("wilayas", "Aïn Defla", 44),
    ("wilayas", "Naâma", 45),
    ("wilayas", "Aïn Témouchent", 46),
    ("wilayas", "Ghardaïa", 47),
    ("wilayas", "Relizane", 48),
    // Core networks
    ("platforms", "Core Platform 1", 1),
    ("platforms", "Core Platform 2", 2),
    ("platforms", "Metro Platform A", 3),
    ("platforms", "Metro Platform B", 4),
    ("platforms", "Access Platform 1", 5),
    ("platforms", "Access Platform 2", 6),
    ("platforms", "Backbone Platform", 7),
    ("platforms", "Regional Platform", 8),
    ("region_nodes", "Node-ALG-01 (Algiers Central)", 1),
    ("region_nodes", "Node-ORA-01 (Oran Main)", 2),
    ("region_nodes", "Node-CST-01 (Constantine)", 3),
    ("region_nodes", "Node-ANN-01 (Annaba)", 4),
    ("region_nodes", "Node-SET-01 (Sétif)", 5),
    ("region_nodes", "Node-TLM-01 (Tlemcen)", 6),
    ("region_nodes", "Node-BJA-01 (Béjaïa)", 7),
    ("region_nodes", "Node-SKD-01 (Skikda)", 8),
    ("region_nodes", "Node-GHR-01 (Ghardaïa)", 9),
    ("region_nodes", "Node-OUR-01 (Ouargla)", 10),
    // Backbone internet networks
    ("interconnect_types", "BGP Peering", 1),
    ("interconnect_types", "Transit Link", 2),
    ("interconnect_types", "IXP Connection", 3),
    ("interconnect_types", "Satellite Link", 4),
    ("interconnect_types", "Submarine Cable", 5),
    ("interconnect_types", "Terrestrial Link", 6),
    ("interconnect_types", "MPLS VPN", 7),
    ("interconnect_types", "Direct Connect", 8),
    ("platform_igws", "IGW-ALG-01 (Algiers Gateway)", 1),
    ("platform_igws", "IGW-ORA-01 (Oran Gateway)", 2),
    ("platform_igws", "IGW-CST-01 (Constantine Gateway)", 3),
    ("platform_igws", "IGW-ANN-01 (Annaba Gateway)", 4),
    ("platform_igws", "Platform-INT-01 (International)", 5),
    ("platform_igws", "Platform-SAT-01 (Satellite)", 6),
    ("platform_igws", "Platform-SUB-01 (Submarine)", 7),
    ("platform_igws", "Platform-TER-01 (Terrestrial)", 8),
];
