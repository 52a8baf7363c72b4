use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::domain::NetworkDomain;
use crate::error::AppError;
use crate::lifecycle;
use crate::normalize::format_ts;
use crate::repo;

/// Distinguished actor identity stamped on automatic archivals, so audit
/// trails distinguish the sweep from human operators.
pub const SYSTEM_ARCHIVAL_ACTOR: &str = "system_archival";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainSweepOutcome {
    pub checked: i64,
    pub archived: i64,
    pub errors: Vec<String>,
}

/// Result of one sweep run. Re-running immediately archives nothing new:
/// just-archived records fail the not-already-archived precondition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub total_checked: i64,
    pub total_archived: i64,
    pub by_domain: BTreeMap<String, DomainSweepOutcome>,
    pub errors: Vec<String>,
    pub ran_at: String,
}

/// Archive every eligible incident across all network domains.
///
/// Intended to be invoked periodically (about hourly) by external
/// scheduling infrastructure. Candidates come from a cheap SQL pre-filter
/// and are re-validated with the full `can_archive` check; one record's
/// failure (including a concurrent-writer conflict on the archival
/// compare-and-swap) is recorded and the sweep continues.
pub fn run_auto_archival(conn: &Connection, now: OffsetDateTime) -> Result<SweepReport, AppError> {
    let mut report = SweepReport {
        total_checked: 0,
        total_archived: 0,
        by_domain: BTreeMap::new(),
        errors: Vec::new(),
        ran_at: format_ts(now),
    };

    for domain in NetworkDomain::ALL {
        let mut outcome = DomainSweepOutcome::default();

        let candidates = match repo::archival_candidates(conn, domain) {
            Ok(c) => c,
            Err(e) => {
                // A failed candidate scan is this domain's failure, not the sweep's.
                let msg = format!("{}: candidate scan failed: {e}", domain.as_str());
                warn!(domain = domain.as_str(), error = %e, "sweep candidate scan failed");
                outcome.errors.push(msg.clone());
                report.errors.push(msg);
                report.by_domain.insert(domain.as_str().to_string(), outcome);
                continue;
            }
        };

        outcome.checked = candidates.len() as i64;
        report.total_checked += outcome.checked;

        for incident in candidates {
            if !lifecycle::can_archive(&incident, now) {
                // Pre-filter superset: typically records still inside the cooldown.
                continue;
            }
            match lifecycle::archive(&incident, SYSTEM_ARCHIVAL_ACTOR, now) {
                Ok(archived) => match repo::persist_archival(conn, &archived, now) {
                    Ok(()) => {
                        outcome.archived += 1;
                        report.total_archived += 1;
                    }
                    Err(e) => {
                        let msg = format!("failed to archive {}: {e}", incident.id);
                        warn!(incident = %incident.id, error = %e, "sweep archival write failed");
                        outcome.errors.push(msg.clone());
                        report.errors.push(msg);
                    }
                },
                Err(e) => {
                    let msg = format!("failed to archive {}: {e}", incident.id);
                    outcome.errors.push(msg.clone());
                    report.errors.push(msg);
                }
            }
        }

        report.by_domain.insert(domain.as_str().to_string(), outcome);
    }

    info!(
        checked = report.total_checked,
        archived = report.total_archived,
        errors = report.errors.len(),
        "auto-archival sweep completed"
    );
    Ok(report)
}
