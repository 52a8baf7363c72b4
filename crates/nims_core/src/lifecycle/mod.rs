use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::Incident;
use crate::normalize::{format_ts, parse_ts};

/// Severity tier thresholds, in seconds of unresolved elapsed time.
/// Tiers are half-open `[lower, upper)`: exactly one hour elapsed is Low.
/// The search engine builds its status-bucket predicates from these same
/// constants so list filters and badge colors can never disagree.
pub const SEVERITY_NEW_MAX_SECS: i64 = 1 * 3600;
pub const SEVERITY_LOW_MAX_SECS: i64 = 2 * 3600;
pub const SEVERITY_MEDIUM_MAX_SECS: i64 = 4 * 3600;

/// Archival cooldown: a resolved incident stays visible for this long.
pub const ARCHIVE_COOLDOWN_SECS: i64 = 2 * 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    New,
    Low,
    Medium,
    Critical,
    Resolved,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::New => "New",
            Severity::Low => "Low Severity",
            Severity::Medium => "Medium Severity",
            Severity::Critical => "Critical",
            Severity::Resolved => "Resolved",
        }
    }
}

/// Minutes between `occurred_at` and (`resolved_at` or `now`), floored.
///
/// Returns `None` when `occurred_at` is missing (nothing to measure; the
/// caller must not persist a duration in that case). Inverted timestamps on
/// corrupted rows clamp to 0 rather than erroring.
pub fn compute_duration_minutes(
    occurred_at: Option<OffsetDateTime>,
    resolved_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Option<i64> {
    let start = occurred_at?;
    let end = resolved_at.unwrap_or(now);
    let secs = (end - start).whole_seconds().max(0);
    Some(secs / 60)
}

pub fn derive_is_resolved(resolved_at: Option<OffsetDateTime>) -> bool {
    resolved_at.is_some()
}

/// Age-based severity while unresolved; resolution always overrides age.
/// A record with no `occurred_at` classifies as New rather than erroring.
pub fn classify_severity(
    occurred_at: Option<OffsetDateTime>,
    resolved_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Severity {
    if resolved_at.is_some() {
        return Severity::Resolved;
    }
    let Some(start) = occurred_at else {
        return Severity::New;
    };
    let elapsed = (now - start).whole_seconds();
    if elapsed < SEVERITY_NEW_MAX_SECS {
        Severity::New
    } else if elapsed < SEVERITY_LOW_MAX_SECS {
        Severity::Low
    } else if elapsed < SEVERITY_MEDIUM_MAX_SECS {
        Severity::Medium
    } else {
        Severity::Critical
    }
}

/// Duration rendering outcome. The engine tags unknown input; what string an
/// unknown renders as ("Calculating…", "-") is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DurationDisplay {
    Formatted(String),
    Unknown,
}

/// `"{d}d {h}h {m}m"` with zero-valued parts omitted; all-zero renders "0m".
pub fn format_duration(total_minutes: Option<i64>) -> DurationDisplay {
    let Some(total) = total_minutes else {
        return DurationDisplay::Unknown;
    };
    let total = total.max(0);
    let days = total / (24 * 60);
    let hours = (total % (24 * 60)) / 60;
    let minutes = total % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if parts.is_empty() {
        DurationDisplay::Formatted("0m".to_string())
    } else {
        DurationDisplay::Formatted(parts.join(" "))
    }
}

/// Incident age in hours, against recovery time when resolved.
pub fn age_in_hours(incident: &Incident, now: OffsetDateTime) -> f64 {
    let Some(start) = parse_ts(&incident.occurred_at) else {
        return 0.0;
    };
    let end = parse_ts(&incident.resolved_at).unwrap_or(now);
    ((end - start).whole_seconds().max(0) as f64) / 3600.0
}

/// One unmet archival precondition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArchiveBlocker {
    NotResolved,
    MissingCause,
    MissingOrigin,
    AlreadyArchived,
    CooldownActive { remaining_minutes: i64 },
}

impl fmt::Display for ArchiveBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveBlocker::NotResolved => write!(f, "incident is not resolved"),
            ArchiveBlocker::MissingCause => write!(f, "cause is not filled in"),
            ArchiveBlocker::MissingOrigin => write!(f, "origin is not filled in"),
            ArchiveBlocker::AlreadyArchived => write!(f, "incident is already archived"),
            ArchiveBlocker::CooldownActive { remaining_minutes } => write!(
                f,
                "cooldown after resolution still active ({remaining_minutes}m remaining)"
            ),
        }
    }
}

/// Every archival precondition the record currently fails, in a fixed order.
///
/// Archival requires ALL of: resolved, cause filled, origin filled, not
/// already archived, and at least the cooldown elapsed since resolution.
/// A record missing cause or origin stays unarchived indefinitely until an
/// operator categorizes it.
pub fn archive_blockers(incident: &Incident, now: OffsetDateTime) -> Vec<ArchiveBlocker> {
    let mut blockers = Vec::new();

    let resolved_at = parse_ts(&incident.resolved_at);
    if resolved_at.is_none() {
        blockers.push(ArchiveBlocker::NotResolved);
    }
    if is_blank(&incident.cause) {
        blockers.push(ArchiveBlocker::MissingCause);
    }
    if is_blank(&incident.origin) {
        blockers.push(ArchiveBlocker::MissingOrigin);
    }
    if incident.is_archived {
        blockers.push(ArchiveBlocker::AlreadyArchived);
    }
    if let Some(resolved) = resolved_at {
        let since_resolution = (now - resolved).whole_seconds();
        if since_resolution < ARCHIVE_COOLDOWN_SECS {
            let remaining = ARCHIVE_COOLDOWN_SECS - since_resolution;
            blockers.push(ArchiveBlocker::CooldownActive {
                remaining_minutes: (remaining + 59) / 60,
            });
        }
    }

    blockers
}

pub fn can_archive(incident: &Incident, now: OffsetDateTime) -> bool {
    archive_blockers(incident, now).is_empty()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArchiveError {
    NotEligible { blockers: Vec<ArchiveBlocker> },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::NotEligible { blockers } => {
                let reasons: Vec<String> = blockers.iter().map(|b| b.to_string()).collect();
                write!(f, "incident cannot be archived: {}", reasons.join("; "))
            }
        }
    }
}

impl std::error::Error for ArchiveError {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestoreError {
    NotArchived,
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreError::NotArchived => write!(f, "incident is not archived"),
        }
    }
}

impl std::error::Error for RestoreError {}

/// Archive the record, stamping who and when. Not idempotent: a second call
/// fails `NotEligible` because the record is already archived, so callers
/// wanting idempotence check `is_archived` first.
pub fn archive(
    incident: &Incident,
    actor: &str,
    now: OffsetDateTime,
) -> Result<Incident, ArchiveError> {
    let blockers = archive_blockers(incident, now);
    if !blockers.is_empty() {
        return Err(ArchiveError::NotEligible { blockers });
    }
    let mut archived = incident.clone();
    archived.is_archived = true;
    archived.archived_at = Some(format_ts(now));
    archived.archived_by = Some(actor.to_string());
    archived.updated_by = Some(actor.to_string());
    Ok(archived)
}

/// Clear the archival marks; `archived_at`/`archived_by` always clear
/// together with the flag.
pub fn restore(incident: &Incident, actor: &str) -> Result<Incident, RestoreError> {
    if !incident.is_archived {
        return Err(RestoreError::NotArchived);
    }
    let mut restored = incident.clone();
    restored.is_archived = false;
    restored.archived_at = None;
    restored.archived_by = None;
    restored.updated_by = Some(actor.to_string());
    Ok(restored)
}

/// Recompute the derived columns on a record about to be persisted.
/// `duration_minutes` is only written when `occurred_at` is present.
pub fn apply_derived_fields(incident: &mut Incident, now: OffsetDateTime) {
    let occurred = parse_ts(&incident.occurred_at);
    let resolved = parse_ts(&incident.resolved_at);
    incident.duration_minutes = compute_duration_minutes(occurred, resolved, now);
    incident.is_resolved = derive_is_resolved(resolved);
}

/// Severity of a stored record (parses its canonical timestamps first).
pub fn severity_of(incident: &Incident, now: OffsetDateTime) -> Severity {
    classify_severity(
        parse_ts(&incident.occurred_at),
        parse_ts(&incident.resolved_at),
        now,
    )
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
