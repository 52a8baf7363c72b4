use std::net::IpAddr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::domain::{DomainFields, Incident};
use crate::error::AppError;
use crate::normalize::{format_ts, parse_ts, parse_ts_strict};

const MAX_INCIDENT_AGE_DAYS: i64 = 365;
const MAX_FUTURE_HOURS: i64 = 24;
const MAX_RECOVERY_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn require(
    issues: &mut Vec<ValidationIssue>,
    field: &str,
    value: &str,
) {
    if value.trim().is_empty() {
        issues.push(
            ValidationIssue::new("VALIDATION_FIELD_REQUIRED", format!("{field} is required"))
                .with_details(field.to_string()),
        );
    }
}

fn check_ip(issues: &mut Vec<ValidationIssue>, raw: &str) {
    if raw.trim().parse::<IpAddr>().is_err() {
        issues.push(
            ValidationIssue::new(
                "VALIDATION_IP_INVALID",
                "IP address must be valid IPv4 or IPv6",
            )
            .with_details(format!("value={raw}")),
        );
    }
}

fn check_site_name(issues: &mut Vec<ValidationIssue>, site: &str) {
    let site = site.trim();
    if site.is_empty() {
        return;
    }
    if site.len() < 2 || site.len() > 50 {
        issues.push(
            ValidationIssue::new(
                "VALIDATION_SITE_NAME_INVALID",
                "Site name must be between 2 and 50 characters",
            )
            .with_details(format!("value={site}")),
        );
        return;
    }
    let valid = site
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_');
    if !valid {
        issues.push(
            ValidationIssue::new(
                "VALIDATION_SITE_NAME_INVALID",
                "Site name can only contain letters, numbers, spaces, hyphens and underscores",
            )
            .with_details(format!("value={site}")),
        );
    }
}

fn check_extremities(
    issues: &mut Vec<ValidationIssue>,
    extremity_a: Option<&str>,
    dot_a: Option<&str>,
    extremity_b: Option<&str>,
    dot_b: Option<&str>,
) {
    let blank = |v: Option<&str>| v.map_or(true, |s| s.trim().is_empty());
    if !blank(extremity_a) && blank(dot_a) {
        issues.push(ValidationIssue::new(
            "VALIDATION_EXTREMITY_INCONSISTENT",
            "DOT extremity A is required when extremity A is provided",
        ));
    }
    if !blank(extremity_b) && blank(dot_b) {
        issues.push(ValidationIssue::new(
            "VALIDATION_EXTREMITY_INCONSISTENT",
            "DOT extremity B is required when extremity B is provided",
        ));
    }
    if let (Some(a), Some(b)) = (extremity_a, extremity_b) {
        if !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim()) {
            issues.push(ValidationIssue::new(
                "VALIDATION_EXTREMITY_INCONSISTENT",
                "Extremity A and extremity B cannot be the same location",
            ));
        }
    }
}

/// Input-boundary validation for a record about to be saved. Returns every
/// violated rule; an empty list means the record is acceptable. The engine
/// itself never re-checks these — persisted records are assumed to have
/// passed here.
pub fn validate_incident_input(incident: &Incident, now: OffsetDateTime) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let occurred = match incident.occurred_at.as_deref() {
        None => {
            issues.push(ValidationIssue::new(
                "VALIDATION_OCCURRED_REQUIRED",
                "Incident date and time is required",
            ));
            None
        }
        Some(raw) => match parse_ts_strict(raw) {
            Ok(dt) => Some(dt),
            Err(e) => {
                issues.push(
                    ValidationIssue::new(
                        "VALIDATION_TS_PARSE_FAILED",
                        "Incident timestamp is not a valid RFC3339 value",
                    )
                    .with_details(e),
                );
                None
            }
        },
    };

    let resolved = match incident.resolved_at.as_deref() {
        None => None,
        Some(raw) => match parse_ts_strict(raw) {
            Ok(dt) => Some(dt),
            Err(e) => {
                issues.push(
                    ValidationIssue::new(
                        "VALIDATION_TS_PARSE_FAILED",
                        "Recovery timestamp is not a valid RFC3339 value",
                    )
                    .with_details(e),
                );
                None
            }
        },
    };

    if let Some(occurred) = occurred {
        if occurred < now - Duration::days(MAX_INCIDENT_AGE_DAYS) {
            issues.push(ValidationIssue::new(
                "VALIDATION_INCIDENT_TOO_OLD",
                "Incident time cannot be more than 1 year in the past",
            ));
        }
        if occurred > now + Duration::hours(MAX_FUTURE_HOURS) {
            issues.push(ValidationIssue::new(
                "VALIDATION_INCIDENT_IN_FUTURE",
                "Incident time cannot be more than 24 hours in the future",
            ));
        }
        if let Some(resolved) = resolved {
            if resolved <= occurred {
                issues.push(ValidationIssue::new(
                    "VALIDATION_RECOVERY_BEFORE_INCIDENT",
                    "Recovery time must be after the incident time",
                ));
            } else if resolved > occurred + Duration::days(MAX_RECOVERY_DAYS) {
                issues.push(ValidationIssue::new(
                    "VALIDATION_RECOVERY_TOO_LATE",
                    "Recovery time cannot be more than 30 days after the incident time",
                ));
            }
        }
    }

    match &incident.fields {
        DomainFields::Transport(f) => {
            require(&mut issues, "region_loop", &f.region_loop);
            require(&mut issues, "system_capacity", &f.system_capacity);
            require(&mut issues, "extremity_a", &f.extremity_a);
            require(&mut issues, "extremity_b", &f.extremity_b);
            require(&mut issues, "dot_extremity_b", &f.dot_extremity_b);
            check_extremities(
                &mut issues,
                Some(&f.extremity_a),
                f.dot_extremity_a.as_deref(),
                Some(&f.extremity_b),
                Some(&f.dot_extremity_b),
            );
        }
        DomainFields::FileAccess(f) => {
            require(&mut issues, "do_wilaya", &f.do_wilaya);
            require(&mut issues, "zone_metro", &f.zone_metro);
            require(&mut issues, "site", &f.site);
            require(&mut issues, "ip_address", &f.ip_address);
            if !f.ip_address.trim().is_empty() {
                check_ip(&mut issues, &f.ip_address);
            }
            check_site_name(&mut issues, &f.site);
        }
        DomainFields::RadioAccess(f) => {
            require(&mut issues, "do_wilaya", &f.do_wilaya);
            require(&mut issues, "site", &f.site);
            require(&mut issues, "ip_address", &f.ip_address);
            if !f.ip_address.trim().is_empty() {
                check_ip(&mut issues, &f.ip_address);
            }
            check_site_name(&mut issues, &f.site);
        }
        DomainFields::Core(f) => {
            require(&mut issues, "platform", &f.platform);
            require(&mut issues, "region_node", &f.region_node);
            if let Some(site) = f.site.as_deref() {
                check_site_name(&mut issues, site);
            }
            check_extremities(
                &mut issues,
                f.extremity_a.as_deref(),
                f.dot_extremity_a.as_deref(),
                f.extremity_b.as_deref(),
                f.dot_extremity_b.as_deref(),
            );
        }
        DomainFields::BackboneInternet(f) => {
            require(&mut issues, "interconnect_type", &f.interconnect_type);
            require(&mut issues, "platform_igw", &f.platform_igw);
            require(&mut issues, "link_label", &f.link_label);
        }
    }

    issues
}

/// Collapse validation issues into the caller-facing error; the operation
/// must abort with no partial state change when this fails.
pub fn ensure_valid(incident: &Incident, now: OffsetDateTime) -> Result<(), AppError> {
    let issues = validate_incident_input(incident, now);
    if issues.is_empty() {
        return Ok(());
    }
    let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
    Err(AppError::new("VALIDATION_FAILED", messages.join("; ")))
}

fn count_similar(
    conn: &Connection,
    where_sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM incidents WHERE {where_sql}");
    conn.query_row(&sql, params, |row| row.get(0)).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to check for duplicate incidents")
            .with_details(e.to_string())
    })
}

/// Look for a suspected duplicate: another *active* incident for the same
/// equipment inside the original reporting windows (same transport/core
/// extremities within 1 hour, same IP within 2 hours, same site within
/// 1 hour). Advisory only; the caller decides whether to block the save.
pub fn check_duplicate(
    conn: &Connection,
    incident: &Incident,
    _now: OffsetDateTime,
) -> Result<Vec<ValidationIssue>, AppError> {
    let Some(occurred) = parse_ts(&incident.occurred_at) else {
        return Ok(Vec::new());
    };
    let mut issues = Vec::new();
    let domain_tag = incident.domain().as_str();

    let window = |hours: i64| {
        (
            format_ts(occurred - Duration::hours(hours)),
            format_ts(occurred + Duration::hours(hours)),
        )
    };

    match &incident.fields {
        DomainFields::Transport(f) => {
            let (lo, hi) = window(1);
            let count = count_similar(
                conn,
                "domain = ?1 AND id <> ?2 AND resolved_at IS NULL \
                 AND LOWER(COALESCE(extremity_a,'')) = LOWER(?3) \
                 AND LOWER(COALESCE(extremity_b,'')) = LOWER(?4) \
                 AND occurred_at >= ?5 AND occurred_at <= ?6",
                &[
                    &domain_tag,
                    &incident.id,
                    &f.extremity_a,
                    &f.extremity_b,
                    &lo,
                    &hi,
                ],
            )?;
            if count > 0 {
                issues.push(
                    ValidationIssue::new(
                        "VALIDATION_DUPLICATE_SUSPECTED",
                        format!(
                            "A similar incident for {} to {} already exists within the last hour",
                            f.extremity_a, f.extremity_b
                        ),
                    )
                    .with_details(format!("matches={count}")),
                );
            }
        }
        DomainFields::FileAccess(_) | DomainFields::RadioAccess(_) => {
            let (ip, site) = match &incident.fields {
                DomainFields::FileAccess(f) => (f.ip_address.clone(), f.site.clone()),
                DomainFields::RadioAccess(f) => (f.ip_address.clone(), f.site.clone()),
                _ => unreachable!(),
            };
            let (lo, hi) = window(2);
            let count = count_similar(
                conn,
                "domain = ?1 AND id <> ?2 AND resolved_at IS NULL \
                 AND COALESCE(ip_address,'') = ?3 \
                 AND occurred_at >= ?4 AND occurred_at <= ?5",
                &[&domain_tag, &incident.id, &ip, &lo, &hi],
            )?;
            if count > 0 {
                issues.push(
                    ValidationIssue::new(
                        "VALIDATION_DUPLICATE_SUSPECTED",
                        format!(
                            "A similar incident for IP {ip} already exists within the last 2 hours"
                        ),
                    )
                    .with_details(format!("matches={count}")),
                );
            }
            let (lo, hi) = window(1);
            let count = count_similar(
                conn,
                "domain = ?1 AND id <> ?2 AND resolved_at IS NULL \
                 AND LOWER(COALESCE(site,'')) = LOWER(?3) \
                 AND occurred_at >= ?4 AND occurred_at <= ?5",
                &[&domain_tag, &incident.id, &site, &lo, &hi],
            )?;
            if count > 0 {
                issues.push(
                    ValidationIssue::new(
                        "VALIDATION_DUPLICATE_SUSPECTED",
                        format!(
                            "A similar incident for site '{site}' already exists within the last hour"
                        ),
                    )
                    .with_details(format!("matches={count}")),
                );
            }
        }
        DomainFields::Core(_) | DomainFields::BackboneInternet(_) => {}
    }

    Ok(issues)
}
