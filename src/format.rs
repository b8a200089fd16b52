//! Derived fields computed over query results.
//!
//! Everything here is pure and recomputed on every request; a zero
//! denominator always yields `0`.

use chrono::{DateTime, NaiveDate, Utc};

/// `round(part / total * 100)`, or `0` when `total` is zero.
pub fn percentage(part: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u64
}

/// `round(occupancy / capacity * 100)`, or `0` when capacity is zero.
pub fn occupancy_rate(occupancy: i64, capacity: i64) -> u64 {
    if capacity <= 0 {
        return 0;
    }
    (occupancy.max(0) as f64 / capacity as f64 * 100.0).round() as u64
}

/// Mean rounded to two decimals, `0.0` on empty input.
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// An issuance is overdue iff it has not been returned and its due date is
/// strictly before `now`. An unparseable due date is never overdue.
pub fn is_overdue(due_date: Option<&str>, returned_at: Option<&str>, now: DateTime<Utc>) -> bool {
    if returned_at.is_some_and(|r| !r.trim().is_empty()) {
        return false;
    }
    due_date
        .and_then(parse_timestamp)
        .is_some_and(|due| due < now)
}

/// `"{first} {last}"` trimmed, else `name`, else the email local part.
pub fn display_name(
    first: Option<&str>,
    last: Option<&str>,
    name: Option<&str>,
    email: Option<&str>,
) -> String {
    let joined = format!("{} {}", first.unwrap_or("").trim(), last.unwrap_or("").trim());
    let joined = joined.trim();
    if !joined.is_empty() {
        return joined.to_string();
    }
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .and_then(|e| e.split('@').next())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Academic year to its inclusive semester range.
pub fn semester_range(year: u8) -> Option<(i64, i64)> {
    match year {
        1..=4 => {
            let first = i64::from(year) * 2 - 1;
            Some((first, first + 1))
        }
        _ => None,
    }
}

/// Inverse of [`semester_range`]; semesters outside 1..=8 have no year.
pub fn year_of_semester(semester: i64) -> Option<u8> {
    match semester {
        1..=8 => Some(((semester + 1) / 2) as u8),
        _ => None,
    }
}
