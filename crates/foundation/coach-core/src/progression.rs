//! Per-user progression record.

use crate::level::level_for_xp;
use crate::streak::next_streak;
use crate::types::UserId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// XP, level and streak for one user.
///
/// `level` is always derived from `total_xp`. It is serialized for readers
/// of the stored document but recomputed on every deserialize, so a stale
/// stored level can never be observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ProgressionRecord")]
pub struct ProgressionState {
    user_id: UserId,
    total_xp: u64,
    level: u64,
    streak_count: u32,
    last_active_date: Option<NaiveDate>,
}

/// Wire shape accepted on load; any stored `level` is ignored
#[derive(Deserialize)]
struct ProgressionRecord {
    user_id: UserId,
    #[serde(default)]
    total_xp: u64,
    #[serde(default)]
    streak_count: u32,
    #[serde(default)]
    last_active_date: Option<NaiveDate>,
}

impl From<ProgressionRecord> for ProgressionState {
    fn from(record: ProgressionRecord) -> Self {
        Self::restore(
            record.user_id,
            record.total_xp,
            record.streak_count,
            record.last_active_date,
        )
    }
}

impl ProgressionState {
    /// Fresh record for a user who has never been active
    pub fn new(user_id: UserId) -> Self {
        Self::restore(user_id, 0, 0, None)
    }

    /// Rebuild a record from stored fields
    pub fn restore(
        user_id: UserId,
        total_xp: u64,
        streak_count: u32,
        last_active_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            user_id,
            total_xp,
            level: level_for_xp(total_xp),
            streak_count,
            last_active_date,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn total_xp(&self) -> u64 {
        self.total_xp
    }

    pub fn level(&self) -> u64 {
        self.level
    }

    pub fn streak_count(&self) -> u32 {
        self.streak_count
    }

    pub fn last_active_date(&self) -> Option<NaiveDate> {
        self.last_active_date
    }

    /// Next state after earning `amount` XP for an activity on `activity`.
    ///
    /// The last active date never moves backwards: a late-logged activity
    /// earns XP but leaves both the streak and the date alone.
    pub fn award(&self, amount: u64, activity: NaiveDate) -> Self {
        let total_xp = self.total_xp.saturating_add(amount);
        let streak_count = next_streak(self.streak_count, self.last_active_date, activity);
        let last_active_date = match self.last_active_date {
            Some(last) if last > activity => Some(last),
            _ => Some(activity),
        };

        Self::restore(self.user_id.clone(), total_xp, streak_count, last_active_date)
    }

    /// True if the user leveled up between `previous` and `self`
    pub fn leveled_up_from(&self, previous: &ProgressionState) -> bool {
        self.level > previous.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streak::parse_activity_date;

    fn user() -> UserId {
        "user-1".parse().unwrap()
    }

    fn day(raw: &str) -> NaiveDate {
        parse_activity_date(raw).unwrap()
    }

    #[test]
    fn test_new_state_defaults() {
        let state = ProgressionState::new(user());
        assert_eq!(state.total_xp(), 0);
        assert_eq!(state.level(), 1);
        assert_eq!(state.streak_count(), 0);
        assert_eq!(state.last_active_date(), None);
    }

    #[test]
    fn test_award_updates_level_and_streak() {
        let state = ProgressionState::restore(user(), 495, 5, Some(day("2024-01-09")));
        let next = state.award(10, day("2024-01-10"));

        assert_eq!(next.total_xp(), 505);
        assert_eq!(next.level(), 2);
        assert_eq!(next.streak_count(), 6);
        assert_eq!(next.last_active_date(), Some(day("2024-01-10")));
        assert!(next.leveled_up_from(&state));
    }

    #[test]
    fn test_award_for_earlier_day_keeps_last_date() {
        let state = ProgressionState::restore(user(), 100, 3, Some(day("2024-01-10")));
        let next = state.award(10, day("2024-01-05"));

        assert_eq!(next.total_xp(), 110);
        assert_eq!(next.streak_count(), 3);
        assert_eq!(next.last_active_date(), Some(day("2024-01-10")));
    }

    #[test]
    fn test_stale_stored_level_is_recomputed() {
        let json = r#"{"user_id":"user-1","total_xp":1250,"level":1,"streak_count":2,"last_active_date":"2024-01-10"}"#;
        let state: ProgressionState = serde_json::from_str(json).unwrap();
        assert_eq!(state.level(), 3);
        assert_eq!(state.last_active_date(), Some(day("2024-01-10")));
    }

    #[test]
    fn test_serialized_shape() {
        let state = ProgressionState::restore(user(), 600, 1, None);
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["level"], 2);
        assert_eq!(value["last_active_date"], serde_json::Value::Null);

        let back: ProgressionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
