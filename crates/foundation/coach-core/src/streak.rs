//! Day-streak tracker.
//!
//! The whole state machine is the pair (count, last active day). Dates are
//! calendar days with no time component, so two activities on the same day
//! never break or double-count a streak.

use crate::{Error, Result};
use chrono::NaiveDate;

/// Whole calendar days from `last` to `activity` (negative if `activity` is earlier)
pub fn days_between(last: NaiveDate, activity: NaiveDate) -> i64 {
    activity.signed_duration_since(last).num_days()
}

/// Streak count after an activity on `activity`.
///
/// - never active before: 1
/// - exactly one day later: count + 1
/// - same day or earlier: unchanged
/// - gap of more than one day: reset to 1
pub fn next_streak(streak_count: u32, last_active: Option<NaiveDate>, activity: NaiveDate) -> u32 {
    let Some(last) = last_active else {
        return 1;
    };

    match days_between(last, activity) {
        1 => streak_count.saturating_add(1),
        diff if diff <= 0 => streak_count,
        _ => 1,
    }
}

/// Parse an ISO `YYYY-MM-DD` activity date
pub fn parse_activity_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("invalid activity date '{}': {}", raw, e)))
}
