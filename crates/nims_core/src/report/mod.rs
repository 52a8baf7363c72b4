use rusqlite::Connection;
use time::OffsetDateTime;

use crate::analytics::{cause_distribution, format_mttr, mttr_minutes, origin_distribution};
use crate::audit::{self, AuditAction};
use crate::domain::{Incident, NetworkDomain};
use crate::error::AppError;
use crate::lifecycle::{format_duration, severity_of, DurationDisplay, Severity};
use crate::normalize::format_ts;
use crate::repo;

const RECENT_LIMIT: usize = 50;
const TOP_N: usize = 10;

fn severity_section_label(severity: Severity) -> &'static str {
    match severity {
        Severity::New => "New (<1hr)",
        Severity::Low => "Low (1-2hr)",
        Severity::Medium => "Medium (2-4hr)",
        Severity::Critical => "Critical (>4hr)",
        Severity::Resolved => "Resolved",
    }
}

fn duration_cell(minutes: Option<i64>) -> String {
    match format_duration(minutes) {
        DurationDisplay::Formatted(s) => s,
        DurationDisplay::Unknown => "Calculating...".to_string(),
    }
}

fn share_pct(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Deterministic Markdown report for one period. This is the content layer
/// of the exported report; turning it into PDF or a spreadsheet belongs to
/// the rendering collaborators.
pub fn generate_period_report(
    conn: &Connection,
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
    generated_by: &str,
) -> Result<String, AppError> {
    let start_s = format_ts(start);
    let end_s = format_ts(end);
    let records = repo::select_incidents(
        conn,
        "occurred_at >= ?1 AND occurred_at <= ?2",
        "ORDER BY (occurred_at IS NULL) ASC, occurred_at DESC, id ASC",
        "",
        &[&start_s, &end_s],
    )?;

    let total = records.len() as i64;
    let active = records.iter().filter(|r| !r.is_resolved).count() as i64;
    let resolved = total - active;

    let mut out = String::new();
    out.push_str("# Incident Period Report\n\n");
    out.push_str(&format!("- Period: {start_s} to {end_s}\n"));
    out.push_str(&format!("- Generated at: {}\n", format_ts(now)));
    out.push_str(&format!("- Generated by: {generated_by}\n\n"));

    out.push_str("## Summary\n\n");
    out.push_str(&format!("- Total incidents: **{total}**\n"));
    out.push_str(&format!("- Active: {active}\n"));
    out.push_str(&format!("- Resolved: {resolved}\n"));
    out.push_str(&format!(
        "- Average resolution time: {}\n\n",
        format_mttr(mttr_minutes(&records, start))
    ));

    out.push_str("## Network comparison\n\n");
    out.push_str("| Network | Total | Active | Resolved | Share |\n");
    out.push_str("|---|---:|---:|---:|---:|\n");
    for domain in NetworkDomain::ALL {
        let in_domain: Vec<&Incident> = records.iter().filter(|r| r.domain() == domain).collect();
        let d_total = in_domain.len() as i64;
        let d_active = in_domain.iter().filter(|r| !r.is_resolved).count() as i64;
        out.push_str(&format!(
            "| {} | {} | {} | {} | {}% |\n",
            domain.display_name(),
            d_total,
            d_active,
            d_total - d_active,
            share_pct(d_total, total)
        ));
    }
    out.push('\n');

    out.push_str("## Severity breakdown\n\n");
    for severity in [
        Severity::New,
        Severity::Low,
        Severity::Medium,
        Severity::Critical,
        Severity::Resolved,
    ] {
        let count = records
            .iter()
            .filter(|r| severity_of(r, now) == severity)
            .count();
        out.push_str(&format!("- {}: {}\n", severity_section_label(severity), count));
    }
    out.push('\n');

    out.push_str("## Top causes\n\n");
    let causes = cause_distribution(&records, TOP_N);
    if causes.is_empty() {
        out.push_str("- None recorded.\n");
    }
    for c in &causes {
        out.push_str(&format!("- {}: {}\n", c.value, c.count));
    }
    out.push('\n');

    out.push_str("## Top origins\n\n");
    let origins = origin_distribution(&records, TOP_N);
    if origins.is_empty() {
        out.push_str("- None recorded.\n");
    }
    for o in &origins {
        out.push_str(&format!("- {}: {}\n", o.value, o.count));
    }
    out.push('\n');

    out.push_str("## Recent incidents\n\n");
    out.push_str("| Id | Network | Occurred | Duration | Severity | Status | Cause |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for r in records.iter().take(RECENT_LIMIT) {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            r.short_id(),
            r.domain().display_name(),
            r.occurred_at.as_deref().unwrap_or("UNKNOWN"),
            duration_cell(r.duration_minutes),
            severity_of(r, now).label(),
            if r.is_resolved { "Resolved" } else { "Active" },
            r.cause_display(),
        ));
    }

    audit::record(
        conn,
        Some(generated_by),
        AuditAction::Export,
        "period_report",
        None,
        Some(&serde_json::json!({ "start": start_s, "end": end_s, "incidents": total })),
        now,
    )?;

    Ok(out)
}
