use std::collections::HashMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::domain::{Incident, NetworkDomain};
use crate::error::AppError;
use crate::normalize::{date_days_back, day_key, format_date, format_ts, parse_ts};
use crate::repo;
use crate::search::{count_by_status, StatusFilter};

pub const WEEKDAY_LABELS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Fixed resolution-time histogram bounds in minutes. Half-open buckets,
/// first match wins; every resolved record with a known duration lands in
/// exactly one bucket.
const RESOLUTION_BUCKET_BOUNDS: [(i64, Option<i64>, &str); 8] = [
    (0, Some(30), "0-30m"),
    (30, Some(60), "30-60m"),
    (60, Some(120), "1-2h"),
    (120, Some(240), "2-4h"),
    (240, Some(480), "4-8h"),
    (480, Some(1440), "8-24h"),
    (1440, Some(4320), "1-3d"),
    (4320, None, "3d+"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendPoint {
    /// Calendar day (`YYYY-MM-DD`) in the caller's reference offset.
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourBucket {
    pub hour: u8,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekdayBucket {
    pub weekday: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionBucket {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub value: String,
    pub count: i64,
}

/// Busiest hour-of-day and day-of-week over the trailing window. Absence of
/// data is represented by the caller holding `None`, not by a zeroed default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeakAnalysis {
    pub peak_hour: u8,
    pub peak_hour_count: i64,
    pub peak_weekday: String,
    pub peak_weekday_count: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub new: i64,
    pub low: i64,
    pub medium: i64,
    pub critical: i64,
}

fn in_trailing_window(occurred: OffsetDateTime, days: i64, now: OffsetDateTime) -> bool {
    occurred >= now - Duration::days(days) && occurred <= now
}

/// Mean `duration_minutes` over resolved records with `resolved_at >= since`.
/// `None` means no resolved records in the window (renders as "N/A");
/// records with an unknown duration are excluded, never defaulted.
pub fn mttr_minutes(records: &[Incident], since: OffsetDateTime) -> Option<i64> {
    let mut sum: i64 = 0;
    let mut count: i64 = 0;
    for r in records {
        let Some(resolved) = parse_ts(&r.resolved_at) else {
            continue;
        };
        if resolved < since {
            continue;
        }
        let Some(duration) = r.duration_minutes else {
            continue;
        };
        sum += duration.max(0);
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count)
    }
}

/// Tiered MTTR rendering: `{d}d{h}h` past a day, `{h}h{m}m` past an hour,
/// else `{m}m`; the empty window renders the "N/A" sentinel.
pub fn format_mttr(minutes: Option<i64>) -> String {
    match minutes {
        None => "N/A".to_string(),
        Some(m) => {
            let m = m.max(0);
            if m >= 24 * 60 {
                format!("{}d{}h", m / (24 * 60), (m % (24 * 60)) / 60)
            } else if m >= 60 {
                format!("{}h{}m", m / 60, m % 60)
            } else {
                format!("{m}m")
            }
        }
    }
}

/// Fixed-size series of `days` consecutive calendar-day buckets ending today
/// (inclusive) in the reference offset of `now`. Days with no incidents
/// appear with count 0, never omitted.
pub fn daily_trend(records: &[Incident], days: i64, now: OffsetDateTime) -> Vec<TrendPoint> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for r in records {
        if let Some(occurred) = parse_ts(&r.occurred_at) {
            *counts.entry(day_key(occurred, now)).or_insert(0) += 1;
        }
    }

    let mut out = Vec::with_capacity(days.max(0) as usize);
    for back in (0..days.max(0)).rev() {
        let date = format_date(date_days_back(now, back));
        let count = counts.get(&date).copied().unwrap_or(0);
        out.push(TrendPoint { date, count });
    }
    out
}

/// 24 fixed hour-of-day buckets over the trailing `days`-day window.
pub fn hourly_distribution(records: &[Incident], days: i64, now: OffsetDateTime) -> Vec<HourBucket> {
    let mut counts = [0i64; 24];
    for r in records {
        if let Some(occurred) = parse_ts(&r.occurred_at) {
            if in_trailing_window(occurred, days, now) {
                let hour = occurred.to_offset(now.offset()).hour();
                counts[hour as usize] += 1;
            }
        }
    }
    counts
        .iter()
        .enumerate()
        .map(|(hour, &count)| HourBucket {
            hour: hour as u8,
            count,
        })
        .collect()
}

/// 7 fixed buckets in canonical Monday-first order over the trailing window.
pub fn day_of_week_distribution(
    records: &[Incident],
    days: i64,
    now: OffsetDateTime,
) -> Vec<WeekdayBucket> {
    let mut counts = [0i64; 7];
    for r in records {
        if let Some(occurred) = parse_ts(&r.occurred_at) {
            if in_trailing_window(occurred, days, now) {
                let idx = occurred
                    .to_offset(now.offset())
                    .weekday()
                    .number_days_from_monday();
                counts[idx as usize] += 1;
            }
        }
    }
    WEEKDAY_LABELS
        .iter()
        .zip(counts.iter())
        .map(|(label, &count)| WeekdayBucket {
            weekday: (*label).to_string(),
            count,
        })
        .collect()
}

/// Fixed ordered histogram of resolution times. Bucket counts sum to the
/// number of resolved records with a known duration.
pub fn resolution_time_buckets(records: &[Incident]) -> Vec<ResolutionBucket> {
    let mut counts = [0i64; RESOLUTION_BUCKET_BOUNDS.len()];
    for r in records {
        if !r.is_resolved {
            continue;
        }
        let Some(duration) = r.duration_minutes else {
            continue;
        };
        let duration = duration.max(0);
        for (i, (lower, upper, _)) in RESOLUTION_BUCKET_BOUNDS.iter().enumerate() {
            let above = duration >= *lower;
            let below = upper.map_or(true, |u| duration < u);
            if above && below {
                counts[i] += 1;
                break;
            }
        }
    }
    RESOLUTION_BUCKET_BOUNDS
        .iter()
        .zip(counts.iter())
        .map(|((_, _, label), &count)| ResolutionBucket {
            label: (*label).to_string(),
            count,
        })
        .collect()
}

fn category_distribution<F>(records: &[Incident], top_n: usize, mut display: F) -> Vec<CategoryCount>
where
    F: FnMut(&Incident) -> Option<String>,
{
    // Insertion order is the tie-break, so counts live in a Vec and the sort
    // below is stable.
    let mut order: Vec<CategoryCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for r in records {
        let Some(value) = display(r) else { continue };
        match index.get(&value) {
            Some(&i) => order[i].count += 1,
            None => {
                index.insert(value.clone(), order.len());
                order.push(CategoryCount { value, count: 1 });
            }
        }
    }
    order.sort_by(|a, b| b.count.cmp(&a.count));
    order.truncate(top_n);
    order
}

/// Frequency of cause display values (category, or `Other: {detail}`) over
/// records with a non-blank cause; top-N by count, first-seen tie-break.
pub fn cause_distribution(records: &[Incident], top_n: usize) -> Vec<CategoryCount> {
    category_distribution(records, top_n, |r| {
        r.cause
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|_| r.cause_display())
    })
}

pub fn origin_distribution(records: &[Incident], top_n: usize) -> Vec<CategoryCount> {
    category_distribution(records, top_n, |r| {
        r.origin
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .map(|_| r.origin_display())
    })
}

/// Busiest hour and weekday over the trailing window; `None` when the window
/// holds no incidents. Ties resolve to the earliest slot.
pub fn peak_analysis(records: &[Incident], days: i64, now: OffsetDateTime) -> Option<PeakAnalysis> {
    let hours = hourly_distribution(records, days, now);
    let weekdays = day_of_week_distribution(records, days, now);

    let total: i64 = hours.iter().map(|h| h.count).sum();
    if total == 0 {
        return None;
    }

    let peak_hour = hours
        .iter()
        .max_by(|a, b| a.count.cmp(&b.count).then(b.hour.cmp(&a.hour)))?;
    let peak_weekday_idx = weekdays
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.count.cmp(&b.count).then(ib.cmp(ia)))
        .map(|(i, _)| i)
        .unwrap_or(0);

    Some(PeakAnalysis {
        peak_hour: peak_hour.hour,
        peak_hour_count: peak_hour.count,
        peak_weekday: weekdays[peak_weekday_idx].weekday.clone(),
        peak_weekday_count: weekdays[peak_weekday_idx].count,
    })
}

/// Composite 0-100 per-network health score.
///
/// An empty network scores 100. Otherwise the active severity mix is
/// weighted (new 0.9, low 0.7, medium 0.4, critical 0.1) and averaged over
/// `max(active, 1)`, then combined with the active ratio as
/// `round((1 - 0.5 * active/total) * weighted * 100)`, clamped to `[0, 100]`.
pub fn health_score(total: i64, active: i64, severity: &SeverityCounts) -> i64 {
    if total <= 0 {
        return 100;
    }
    let weighted = (0.9 * severity.new as f64
        + 0.7 * severity.low as f64
        + 0.4 * severity.medium as f64
        + 0.1 * severity.critical as f64)
        / active.max(1) as f64;
    let active_ratio = active as f64 / total as f64;
    let score = ((1.0 - 0.5 * active_ratio) * weighted * 100.0).round() as i64;
    score.clamp(0, 100)
}

pub fn health_status(score: i64) -> &'static str {
    if score >= 90 {
        "Excellent"
    } else if score >= 75 {
        "Good"
    } else if score >= 60 {
        "Fair"
    } else if score >= 40 {
        "Poor"
    } else {
        "Critical"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkStatistics {
    pub total: i64,
    pub active: i64,
    pub resolved: i64,
    pub active_percentage: f64,
    pub resolved_percentage: f64,
    pub severity: SeverityCounts,
    pub health_score: i64,
    pub health_status: String,
}

fn pct(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Counts and health for one network, computed with aggregate `COUNT(*)`
/// queries (the severity predicates are shared with the search engine).
pub fn network_statistics(
    conn: &Connection,
    domain: NetworkDomain,
    now: OffsetDateTime,
) -> Result<NetworkStatistics, AppError> {
    let total = repo::count_incidents(conn, Some(domain))?;
    let active = count_by_status(conn, domain, StatusFilter::Active, now)?;
    let resolved = count_by_status(conn, domain, StatusFilter::Resolved, now)?;
    let severity = SeverityCounts {
        new: count_by_status(conn, domain, StatusFilter::New, now)?,
        low: count_by_status(conn, domain, StatusFilter::Low, now)?,
        medium: count_by_status(conn, domain, StatusFilter::Medium, now)?,
        critical: count_by_status(conn, domain, StatusFilter::Critical, now)?,
    };
    let score = health_score(total, active, &severity);
    Ok(NetworkStatistics {
        total,
        active,
        resolved,
        active_percentage: pct(active, total),
        resolved_percentage: pct(resolved, total),
        severity,
        health_score: score,
        health_status: health_status(score).to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSummary {
    pub domain: String,
    pub display_name: String,
    pub stats: NetworkStatistics,
    pub mttr_display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    pub generated_at: String,
    pub window_days: i64,
    pub networks: Vec<NetworkSummary>,
    pub daily_trend: Vec<TrendPoint>,
    pub hourly_distribution: Vec<HourBucket>,
    pub day_of_week_distribution: Vec<WeekdayBucket>,
    pub resolution_buckets: Vec<ResolutionBucket>,
    pub top_causes: Vec<CategoryCount>,
    pub top_origins: Vec<CategoryCount>,
    pub peak: Option<PeakAnalysis>,
}

/// Dashboard-ready aggregates over the trailing `window_days` window.
/// Recomputed on every call; nothing here is stored.
pub fn build_dashboard_snapshot(
    conn: &Connection,
    now: OffsetDateTime,
    window_days: i64,
) -> Result<DashboardSnapshot, AppError> {
    let window_floor = format_ts(now - Duration::days(window_days));
    let records = repo::select_incidents(
        conn,
        "occurred_at >= ?1 OR resolved_at >= ?1",
        "ORDER BY occurred_at ASC, id ASC",
        "",
        &[&window_floor],
    )?;
    let since = now - Duration::days(window_days);

    let mut networks = Vec::with_capacity(NetworkDomain::ALL.len());
    for domain in NetworkDomain::ALL {
        let stats = network_statistics(conn, domain, now)?;
        let domain_records: Vec<Incident> = records
            .iter()
            .filter(|r| r.domain() == domain)
            .cloned()
            .collect();
        networks.push(NetworkSummary {
            domain: domain.as_str().to_string(),
            display_name: domain.display_name().to_string(),
            stats,
            mttr_display: format_mttr(mttr_minutes(&domain_records, since)),
        });
    }

    Ok(DashboardSnapshot {
        generated_at: format_ts(now),
        window_days,
        networks,
        daily_trend: daily_trend(&records, window_days, now),
        hourly_distribution: hourly_distribution(&records, window_days, now),
        day_of_week_distribution: day_of_week_distribution(&records, window_days, now),
        resolution_buckets: resolution_time_buckets(&records),
        top_causes: cause_distribution(&records, 10),
        top_origins: origin_distribution(&records, 10),
        peak: peak_analysis(&records, window_days, now),
    })
}
