use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

/// Canonical at-rest timestamp form: RFC3339, UTC, whole seconds, trailing Z.
///
/// Keeping every persisted timestamp in this one shape makes lexicographic
/// ordering of the stored strings agree with chronological ordering, which
/// the search SQL depends on for date-range and severity-tier predicates.
pub fn format_ts(dt: OffsetDateTime) -> String {
    let utc = dt.to_offset(UtcOffset::UTC);
    let truncated = utc.replace_nanosecond(0).unwrap_or(utc);
    truncated
        .format(&Rfc3339)
        .unwrap_or_else(|_| truncated.unix_timestamp().to_string())
}

/// Lenient parse used by derivation code: malformed or missing input is
/// treated as absent so dashboards degrade instead of erroring. The input
/// boundary (`validate`) is where malformed timestamps get reported.
pub fn parse_ts(raw: &Option<String>) -> Option<OffsetDateTime> {
    let s = raw.as_deref()?;
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// Strict parse for caller-supplied values; the error carries the offending
/// input so the caller can surface it.
pub fn parse_ts_strict(raw: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| format!("value={raw}; err={e}"))
}

/// Calendar-day key (`YYYY-MM-DD`) in the reference offset of `at`.
///
/// Trend bucketing converts every record into the caller's reference offset
/// before taking the date, so a record never lands in a different bucket
/// depending on which offset it was stored with.
pub fn day_key(dt: OffsetDateTime, reference: OffsetDateTime) -> String {
    format_date(dt.to_offset(reference.offset()).date())
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// The date `days_back` calendar days before `now`, in `now`'s offset.
pub fn date_days_back(now: OffsetDateTime, days_back: i64) -> Date {
    (now - Duration::days(days_back)).date()
}
