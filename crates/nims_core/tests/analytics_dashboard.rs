use pretty_assertions::assert_eq;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use nims_core::analytics::{
    build_dashboard_snapshot, cause_distribution, daily_trend, day_of_week_distribution,
    format_mttr, health_score, health_status, hourly_distribution, mttr_minutes, peak_analysis,
    resolution_time_buckets, SeverityCounts, WEEKDAY_LABELS,
};
use nims_core::db;
use nims_core::domain::{CoreFields, DomainFields, Incident};
use nims_core::normalize::format_ts;
use nims_core::repo;

// A Monday, so weekday expectations are easy to read.
const NOW: OffsetDateTime = datetime!(2026-03-02 12:00:00 UTC);

fn incident_at(occurred: OffsetDateTime) -> Incident {
    Incident::new(
        format_ts(occurred),
        Some("operator1".to_string()),
        DomainFields::Core(CoreFields {
            platform: "Core Platform 1".to_string(),
            region_node: "Node-ALG-01 (Algiers Central)".to_string(),
            ..CoreFields::default()
        }),
    )
}

fn resolved_incident(occurred: OffsetDateTime, duration_minutes: i64) -> Incident {
    let mut incident = incident_at(occurred);
    incident.resolved_at = Some(format_ts(occurred + Duration::minutes(duration_minutes)));
    incident.is_resolved = true;
    incident.duration_minutes = Some(duration_minutes);
    incident
}

#[test]
fn daily_trend_over_empty_set_is_zero_filled_and_consecutive() {
    let trend = daily_trend(&[], 7, NOW);
    assert_eq!(trend.len(), 7);
    assert!(trend.iter().all(|p| p.count == 0));
    let dates: Vec<&str> = trend.iter().map(|p| p.date.as_str()).collect();
    assert_eq!(
        dates,
        vec![
            "2026-02-24",
            "2026-02-25",
            "2026-02-26",
            "2026-02-27",
            "2026-02-28",
            "2026-03-01",
            "2026-03-02",
        ]
    );
}

#[test]
fn daily_trend_counts_by_calendar_day() {
    let records = vec![
        incident_at(NOW - Duration::hours(2)),
        incident_at(NOW - Duration::hours(3)),
        incident_at(NOW - Duration::days(1)),
    ];
    let trend = daily_trend(&records, 3, NOW);
    let counts: Vec<i64> = trend.iter().map(|p| p.count).collect();
    assert_eq!(counts, vec![0, 1, 2]);
}

#[test]
fn hourly_distribution_always_has_24_buckets() {
    let empty = hourly_distribution(&[], 7, NOW);
    assert_eq!(empty.len(), 24);
    assert!(empty.iter().all(|b| b.count == 0));

    let records = vec![
        incident_at(NOW - Duration::hours(3)), // 09:00
        incident_at(NOW - Duration::days(2) - Duration::hours(3)),
        incident_at(NOW - Duration::hours(12)), // 00:00
    ];
    let buckets = hourly_distribution(&records, 7, NOW);
    assert_eq!(buckets[9].count, 2);
    assert_eq!(buckets[0].count, 1);
    assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 3);
}

#[test]
fn day_of_week_distribution_is_monday_first() {
    let buckets = day_of_week_distribution(&[], 7, NOW);
    let labels: Vec<&str> = buckets.iter().map(|b| b.weekday.as_str()).collect();
    assert_eq!(labels, WEEKDAY_LABELS.to_vec());

    // NOW is a Monday; 3 days back is Friday.
    let records = vec![
        incident_at(NOW - Duration::hours(1)),
        incident_at(NOW - Duration::days(3)),
    ];
    let buckets = day_of_week_distribution(&records, 7, NOW);
    assert_eq!(buckets[0].count, 1, "Monday");
    assert_eq!(buckets[4].count, 1, "Friday");
}

#[test]
fn records_outside_the_trailing_window_are_excluded() {
    let records = vec![
        incident_at(NOW - Duration::days(10)),
        incident_at(NOW - Duration::hours(1)),
    ];
    let buckets = hourly_distribution(&records, 7, NOW);
    assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 1);
}

#[test]
fn resolution_buckets_sum_to_resolved_with_duration() {
    let records = vec![
        resolved_incident(NOW - Duration::days(1), 0),
        resolved_incident(NOW - Duration::days(1), 29),
        resolved_incident(NOW - Duration::days(1), 30),
        resolved_incident(NOW - Duration::days(1), 119),
        resolved_incident(NOW - Duration::days(1), 480),
        resolved_incident(NOW - Duration::days(1), 10_000),
        // Active and unknown-duration records never land in a bucket.
        incident_at(NOW - Duration::hours(1)),
    ];
    let buckets = resolution_time_buckets(&records);
    let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["0-30m", "30-60m", "1-2h", "2-4h", "4-8h", "8-24h", "1-3d", "3d+"]
    );
    let counts: Vec<i64> = buckets.iter().map(|b| b.count).collect();
    // Half-open buckets: 29 stays in [0,30), 30 moves to [30,60), 480 to [480,1440).
    assert_eq!(counts, vec![2, 1, 1, 0, 1, 1, 0, 1]);
    assert_eq!(counts.iter().sum::<i64>(), 6);
}

#[test]
fn mttr_is_na_over_zero_resolved_records() {
    assert_eq!(mttr_minutes(&[], NOW - Duration::days(7)), None);
    assert_eq!(format_mttr(None), "N/A");

    // Active records alone never produce a value.
    let records = vec![incident_at(NOW - Duration::hours(1))];
    assert_eq!(mttr_minutes(&records, NOW - Duration::days(7)), None);
}

#[test]
fn mttr_averages_resolved_durations_in_window() {
    let since = NOW - Duration::days(7);
    let records = vec![
        resolved_incident(NOW - Duration::days(1), 60),
        resolved_incident(NOW - Duration::days(2), 120),
        // Resolved before the window: excluded.
        resolved_incident(NOW - Duration::days(30), 10_000),
    ];
    assert_eq!(mttr_minutes(&records, since), Some(90));
}

#[test]
fn mttr_formatting_is_tiered_by_magnitude() {
    assert_eq!(format_mttr(Some(45)), "45m");
    assert_eq!(format_mttr(Some(90)), "1h30m");
    assert_eq!(format_mttr(Some(24 * 60)), "1d0h");
    assert_eq!(format_mttr(Some(26 * 60 + 30)), "1d2h");
}

#[test]
fn cause_distribution_uses_display_values_and_first_seen_tie_break() {
    let mut a = incident_at(NOW - Duration::hours(1));
    a.cause = Some("Fiber Cut".to_string());
    let mut b = incident_at(NOW - Duration::hours(2));
    b.cause = Some("Other".to_string());
    b.cause_other = Some("Rodent damage".to_string());
    let mut c = incident_at(NOW - Duration::hours(3));
    c.cause = Some("Fiber Cut".to_string());
    let mut d = incident_at(NOW - Duration::hours(4));
    d.cause = Some("Power Failure".to_string());
    let mut e = incident_at(NOW - Duration::hours(5));
    e.cause = Some("   ".to_string());

    let dist = cause_distribution(&[a, b, c, d, e], 10);
    let values: Vec<(&str, i64)> = dist.iter().map(|c| (c.value.as_str(), c.count)).collect();
    // "Other: Rodent damage" ties with "Power Failure" at 1 and was seen first.
    assert_eq!(
        values,
        vec![
            ("Fiber Cut", 2),
            ("Other: Rodent damage", 1),
            ("Power Failure", 1),
        ]
    );
}

#[test]
fn cause_distribution_truncates_to_top_n() {
    let mut records = Vec::new();
    for (cause, copies) in [("A", 3), ("B", 2), ("C", 1)] {
        for _ in 0..copies {
            let mut r = incident_at(NOW - Duration::hours(1));
            r.cause = Some(cause.to_string());
            records.push(r);
        }
    }
    let dist = cause_distribution(&records, 2);
    assert_eq!(dist.len(), 2);
    assert_eq!(dist[0].value, "A");
    assert_eq!(dist[1].value, "B");
}

#[test]
fn peak_analysis_returns_none_on_an_empty_window() {
    assert_eq!(peak_analysis(&[], 7, NOW), None);
    // Records exist but none inside the window: still no data.
    let records = vec![incident_at(NOW - Duration::days(30))];
    assert_eq!(peak_analysis(&records, 7, NOW), None);
}

#[test]
fn peak_analysis_finds_busiest_hour_and_weekday() {
    let records = vec![
        incident_at(NOW - Duration::hours(3)), // Monday 09:00
        incident_at(NOW - Duration::hours(4)), // Monday 08:00
        incident_at(NOW - Duration::days(1) - Duration::hours(3)), // Sunday 09:00
    ];
    let peak = peak_analysis(&records, 7, NOW).expect("data present");
    assert_eq!(peak.peak_hour, 9);
    assert_eq!(peak.peak_hour_count, 2);
    assert_eq!(peak.peak_weekday, "Monday");
    assert_eq!(peak.peak_weekday_count, 2);
}

#[test]
fn health_score_formula_reproduces_fixed_rule() {
    // weighted = (0.9*2 + 0.7*1 + 0.4*1 + 0.1*0) / 4 = 0.725
    // score = round((1 - 0.5 * 4/10) * 0.725 * 100) = round(58.0) = 58
    let counts = SeverityCounts {
        new: 2,
        low: 1,
        medium: 1,
        critical: 0,
    };
    assert_eq!(health_score(10, 4, &counts), 58);
}

#[test]
fn health_score_on_empty_network_is_100() {
    assert_eq!(health_score(0, 0, &SeverityCounts::default()), 100);
}

#[test]
fn health_score_zero_guard_on_active_denominator() {
    // total > 0 but nothing active: max(active, 1) keeps the division defined.
    assert_eq!(health_score(5, 0, &SeverityCounts::default()), 0);
}

#[test]
fn health_score_is_clamped_for_adversarial_inputs() {
    // active > total drives the active-ratio term negative.
    let all_critical = SeverityCounts {
        new: 0,
        low: 0,
        medium: 0,
        critical: 5,
    };
    let score = health_score(1, 5, &all_critical);
    assert!((0..=100).contains(&score), "score={score}");
    assert_eq!(score, 0);

    // Tiny active share of a large total stays within bounds.
    let all_new = SeverityCounts {
        new: 1,
        ..SeverityCounts::default()
    };
    let score = health_score(1000, 1, &all_new);
    assert!((0..=100).contains(&score), "score={score}");
}

#[test]
fn health_status_labels() {
    assert_eq!(health_status(100), "Excellent");
    assert_eq!(health_status(90), "Excellent");
    assert_eq!(health_status(89), "Good");
    assert_eq!(health_status(75), "Good");
    assert_eq!(health_status(60), "Fair");
    assert_eq!(health_status(59), "Poor");
    assert_eq!(health_status(40), "Poor");
    assert_eq!(health_status(39), "Critical");
    assert_eq!(health_status(0), "Critical");
}

#[test]
fn dashboard_snapshot_composes_all_sections() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");

    let mut resolved = resolved_incident(NOW - Duration::hours(5), 60);
    resolved.cause = Some("Power Failure".to_string());
    resolved.origin = Some("Data Center".to_string());
    repo::save_incident(&conn, resolved, Some("operator1"), NOW).expect("save");
    repo::save_incident(&conn, incident_at(NOW - Duration::minutes(30)), Some("operator1"), NOW)
        .expect("save");

    let snapshot = build_dashboard_snapshot(&conn, NOW, 7).expect("snapshot");
    assert_eq!(snapshot.daily_trend.len(), 7);
    assert_eq!(snapshot.hourly_distribution.len(), 24);
    assert_eq!(snapshot.day_of_week_distribution.len(), 7);
    assert_eq!(snapshot.networks.len(), 5);

    let core = snapshot
        .networks
        .iter()
        .find(|n| n.domain == "core")
        .expect("core summary");
    assert_eq!(core.stats.total, 2);
    assert_eq!(core.stats.active, 1);
    assert_eq!(core.stats.resolved, 1);
    assert_eq!(core.stats.severity.new, 1);
    assert_eq!(core.mttr_display, "1h0m");

    let radio = snapshot
        .networks
        .iter()
        .find(|n| n.domain == "radio_access")
        .expect("radio summary");
    assert_eq!(radio.stats.total, 0);
    assert_eq!(radio.stats.health_score, 100);
    assert_eq!(radio.stats.health_status, "Excellent");

    assert_eq!(snapshot.top_causes[0].value, "Power Failure");
    assert!(snapshot.peak.is_some());
}
