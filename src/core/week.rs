//! Calendar helpers for weekly workload records

use chrono::{Datelike, Duration, NaiveDate};

/// Monday of the ISO week containing `date`.
///
/// Workload `week` fields must always be Monday-aligned; callers normalize
/// with this before writing (the engine does not rewrite caller data).
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Inclusive interval overlap test used by the assignment views
pub fn overlaps(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && a_end >= b_start
}
