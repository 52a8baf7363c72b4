use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::domain::{Incident, NetworkDomain};
use crate::error::AppError;
use crate::lifecycle::{
    SEVERITY_LOW_MAX_SECS, SEVERITY_MEDIUM_MAX_SECS, SEVERITY_NEW_MAX_SECS,
};
use crate::normalize::{format_ts, parse_ts_strict};
use crate::repo;

pub mod saved;

/// Status bucket a list view can filter on. The severity tiers use the same
/// threshold constants as `lifecycle::classify_severity`, expressed as
/// predicates on `(resolved_at, occurred_at)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Resolved,
    New,
    Low,
    Medium,
    Critical,
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Option<StatusFilter> {
        match raw {
            "active" => Some(StatusFilter::Active),
            "resolved" => Some(StatusFilter::Resolved),
            "new" => Some(StatusFilter::New),
            "low" => Some(StatusFilter::Low),
            "medium" => Some(StatusFilter::Medium),
            "critical" => Some(StatusFilter::Critical),
            _ => None,
        }
    }
}

/// Caller-supplied search parameter bag. Every field is optional so a saved
/// search's JSON round-trips losslessly; unknown statuses, sort keys and
/// filter names fail closed (ignored or defaulted) because these values
/// arrive from URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchParams {
    pub query: Option<String>,
    /// Inclusive bounds on `occurred_at`, RFC3339.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub status: Option<String>,
    pub cause: Option<String>,
    pub origin: Option<String>,
    /// None = both, Some(false) = working set, Some(true) = historical view.
    pub archived: Option<bool>,
    /// Domain-specific filters, validated against the domain's whitelist.
    pub filters: BTreeMap<String, String>,
    /// Whitelisted sort key, Django-style leading '-' for descending.
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchStats {
    pub total_incidents: i64,
    pub filtered_incidents: i64,
    pub active_incidents: i64,
    pub resolved_incidents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchOutcome {
    pub incidents: Vec<Incident>,
    pub stats: SearchStats,
}

/// How a domain-specific filter value matches its column.
enum MatchMode {
    Exact,
    Contains,
}

/// Per-domain filterable fields. Keys not in this list are ignored.
fn filter_whitelist(domain: NetworkDomain) -> &'static [(&'static str, MatchMode)] {
    match domain {
        NetworkDomain::Transport => &[
            ("region_loop", MatchMode::Exact),
            ("system_capacity", MatchMode::Exact),
            ("extremity_a", MatchMode::Contains),
            ("extremity_b", MatchMode::Contains),
        ],
        NetworkDomain::FileAccess => &[
            ("do_wilaya", MatchMode::Exact),
            ("zone_metro", MatchMode::Contains),
            ("site", MatchMode::Contains),
            ("ip_address", MatchMode::Contains),
        ],
        NetworkDomain::RadioAccess => &[
            ("do_wilaya", MatchMode::Exact),
            ("site", MatchMode::Contains),
            ("ip_address", MatchMode::Contains),
        ],
        NetworkDomain::Core => &[
            ("platform", MatchMode::Exact),
            ("region_node", MatchMode::Exact),
            ("site", MatchMode::Contains),
        ],
        NetworkDomain::BackboneInternet => &[
            ("interconnect_type", MatchMode::Exact),
            ("platform_igw", MatchMode::Exact),
            ("link_label", MatchMode::Contains),
        ],
    }
}

/// Columns the free-text query matches, OR'd. The shared set covers id
/// prefix, categorization, comment and creator; the rest are per-domain
/// location/identifier fields.
fn text_search_columns(domain: NetworkDomain) -> Vec<&'static str> {
    let mut cols = vec!["id", "cause", "origin", "impact_comment", "created_by"];
    cols.extend(match domain {
        NetworkDomain::Transport => {
            ["region_loop", "system_capacity", "extremity_a", "extremity_b"].as_slice()
        }
        NetworkDomain::FileAccess => ["do_wilaya", "zone_metro", "site", "ip_address"].as_slice(),
        NetworkDomain::RadioAccess => ["do_wilaya", "site", "ip_address"].as_slice(),
        NetworkDomain::Core => {
            ["platform", "region_node", "site", "extremity_a", "extremity_b"].as_slice()
        }
        NetworkDomain::BackboneInternet => {
            ["interconnect_type", "platform_igw", "link_label"].as_slice()
        }
    });
    cols
}

/// Whitelisted sort keys -> SQL column. Unknown keys fail closed to the
/// default (`-occurred_at`) rather than erroring, since they arrive in URLs.
fn sort_column(key: &str) -> Option<&'static str> {
    match key {
        "occurred_at" => Some("occurred_at"),
        "resolved_at" => Some("resolved_at"),
        "duration" => Some("duration_minutes"),
        "created_at" => Some("created_at"),
        "updated_at" => Some("updated_at"),
        _ => None,
    }
}

fn order_clause(sort_by: Option<&str>) -> String {
    let raw = sort_by.unwrap_or("-occurred_at");
    let (desc, key) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (col, desc) = match sort_column(key) {
        Some(col) => (col, desc),
        None => ("occurred_at", true),
    };
    let dir = if desc { "DESC" } else { "ASC" };
    // Missing values sort last either way; id keeps the order total.
    format!("ORDER BY ({col} IS NULL) ASC, {col} {dir}, id ASC")
}

fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    for ch in query.chars() {
        if ch == '\\' || ch == '%' || ch == '_' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("%{}%", escaped.to_lowercase())
}

struct QueryParts {
    clauses: Vec<String>,
    args: Vec<Value>,
}

impl QueryParts {
    fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn arg(&mut self, value: impl Into<Value>) -> usize {
        self.args.push(value.into());
        self.args.len()
    }

    fn where_sql(&self) -> String {
        self.clauses.join(" AND ")
    }
}

fn build_where(
    domain: NetworkDomain,
    params: &SearchParams,
    now: OffsetDateTime,
) -> Result<QueryParts, AppError> {
    let mut q = QueryParts {
        clauses: Vec::new(),
        args: Vec::new(),
    };

    let n = q.arg(domain.as_str().to_string());
    q.push(format!("domain = ?{n}"));

    if let Some(archived) = params.archived {
        let n = q.arg(archived as i64);
        q.push(format!("is_archived = ?{n}"));
    }

    if let Some(query) = params.query.as_deref() {
        let trimmed = query.trim();
        if !trimmed.is_empty() {
            let pattern = like_pattern(trimmed);
            let mut ors = Vec::new();
            for col in text_search_columns(domain) {
                let n = q.arg(pattern.clone());
                ors.push(format!("LOWER(COALESCE({col}, '')) LIKE ?{n} ESCAPE '\\'"));
            }
            q.push(format!("({})", ors.join(" OR ")));
        }
    }

    if let Some(from) = params.date_from.as_deref() {
        let dt = parse_ts_strict(from).map_err(|e| {
            AppError::new("VALIDATION_FAILED", "Invalid date range start").with_details(e)
        })?;
        let n = q.arg(format_ts(dt));
        q.push(format!("occurred_at >= ?{n}"));
    }
    if let Some(to) = params.date_to.as_deref() {
        let dt = parse_ts_strict(to).map_err(|e| {
            AppError::new("VALIDATION_FAILED", "Invalid date range end").with_details(e)
        })?;
        let n = q.arg(format_ts(dt));
        q.push(format!("occurred_at <= ?{n}"));
    }

    if let Some(status) = params.status.as_deref().and_then(StatusFilter::parse) {
        push_status_clause(&mut q, status, now);
    }

    if let Some(cause) = params.cause.as_deref() {
        if !cause.trim().is_empty() {
            let n = q.arg(cause.to_string());
            q.push(format!("cause = ?{n}"));
        }
    }
    if let Some(origin) = params.origin.as_deref() {
        if !origin.trim().is_empty() {
            let n = q.arg(origin.to_string());
            q.push(format!("origin = ?{n}"));
        }
    }

    for (key, value) in &params.filters {
        if value.trim().is_empty() {
            continue;
        }
        for (col, mode) in filter_whitelist(domain) {
            if *col == key.as_str() {
                match mode {
                    MatchMode::Exact => {
                        let n = q.arg(value.clone());
                        q.push(format!("{col} = ?{n}"));
                    }
                    MatchMode::Contains => {
                        let n = q.arg(like_pattern(value.trim()));
                        q.push(format!(
                            "LOWER(COALESCE({col}, '')) LIKE ?{n} ESCAPE '\\'"
                        ));
                    }
                }
            }
        }
    }

    Ok(q)
}

/// Severity-tier predicates on `(resolved_at, occurred_at)`. These must agree
/// bit-for-bit with `classify_severity`: tiers are half-open on elapsed time,
/// so the matching `occurred_at` window is open at the older bound and closed
/// at the newer one, and a missing `occurred_at` counts as New.
fn push_status_clause(q: &mut QueryParts, status: StatusFilter, now: OffsetDateTime) {
    let floor = |secs: i64| format_ts(now - Duration::seconds(secs));
    match status {
        StatusFilter::Active => q.push("resolved_at IS NULL"),
        StatusFilter::Resolved => q.push("resolved_at IS NOT NULL"),
        StatusFilter::New => {
            let n = q.arg(floor(SEVERITY_NEW_MAX_SECS));
            q.push(format!(
                "resolved_at IS NULL AND (occurred_at IS NULL OR occurred_at > ?{n})"
            ));
        }
        StatusFilter::Low => {
            let hi = q.arg(floor(SEVERITY_NEW_MAX_SECS));
            let lo = q.arg(floor(SEVERITY_LOW_MAX_SECS));
            q.push(format!(
                "resolved_at IS NULL AND occurred_at <= ?{hi} AND occurred_at > ?{lo}"
            ));
        }
        StatusFilter::Medium => {
            let hi = q.arg(floor(SEVERITY_LOW_MAX_SECS));
            let lo = q.arg(floor(SEVERITY_MEDIUM_MAX_SECS));
            q.push(format!(
                "resolved_at IS NULL AND occurred_at <= ?{hi} AND occurred_at > ?{lo}"
            ));
        }
        StatusFilter::Critical => {
            let n = q.arg(floor(SEVERITY_MEDIUM_MAX_SECS));
            q.push(format!("resolved_at IS NULL AND occurred_at <= ?{n}"));
        }
    }
}

/// Run a search: filtered, sorted page of records plus count statistics.
/// Counts come from `COUNT(*)` queries, never from materializing the full
/// result set.
pub fn search_incidents(
    conn: &Connection,
    domain: NetworkDomain,
    params: &SearchParams,
    now: OffsetDateTime,
    limit: Option<i64>,
    offset: i64,
) -> Result<SearchOutcome, AppError> {
    let q = build_where(domain, params, now)?;
    let where_sql = q.where_sql();
    let refs: Vec<&dyn ToSql> = q.args.iter().map(|v| v as &dyn ToSql).collect();

    let limit_sql = match limit {
        Some(l) => format!("LIMIT {} OFFSET {}", l.max(0), offset.max(0)),
        None if offset > 0 => format!("LIMIT -1 OFFSET {offset}"),
        None => String::new(),
    };

    let incidents = repo::select_incidents(
        conn,
        &where_sql,
        &order_clause(params.sort_by.as_deref()),
        &limit_sql,
        &refs,
    )?;

    let total_incidents = repo::count_incidents(conn, Some(domain))?;
    let filtered_incidents = repo::count_where(conn, &where_sql, &refs)?;
    let active_where = format!("{where_sql} AND resolved_at IS NULL");
    let active_incidents = repo::count_where(conn, &active_where, &refs)?;
    let resolved_incidents = filtered_incidents - active_incidents;

    Ok(SearchOutcome {
        incidents,
        stats: SearchStats {
            total_incidents,
            filtered_incidents,
            active_incidents,
            resolved_incidents,
        },
    })
}

/// Count of active records in a severity tier, used by the dashboard
/// aggregates. Shares `push_status_clause` with the row search.
pub fn count_by_status(
    conn: &Connection,
    domain: NetworkDomain,
    status: StatusFilter,
    now: OffsetDateTime,
) -> Result<i64, AppError> {
    let mut q = QueryParts {
        clauses: Vec::new(),
        args: Vec::new(),
    };
    let n = q.arg(domain.as_str().to_string());
    q.push(format!("domain = ?{n}"));
    push_status_clause(&mut q, status, now);
    let refs: Vec<&dyn ToSql> = q.args.iter().map(|v| v as &dyn ToSql).collect();
    repo::count_where(conn, &q.where_sql(), &refs)
}
