//! Progression service: XP awards, streaks, achievements.

use chrono::NaiveDate;
use coach_config::XpConfig;
use coach_core::{evaluate_achievements, Achievement, ActivityStats, Error, ProgressionState, Result, UserId};
use coach_store::{load_or_create, StateStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Activities that earn XP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    WeightLog,
    WorkoutCompleted,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::WeightLog => write!(f, "weight_log"),
            ActivityKind::WorkoutCompleted => write!(f, "workout_completed"),
        }
    }
}

impl FromStr for ActivityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "weight_log" | "weight" => Ok(ActivityKind::WeightLog),
            "workout_completed" | "workout" => Ok(ActivityKind::WorkoutCompleted),
            other => Err(Error::Validation(format!("unknown activity '{}'", other))),
        }
    }
}

/// Result of an XP award
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAward {
    pub xp_awarded: u64,
    pub state: ProgressionState,
    pub leveled_up: bool,
}

/// Streak view returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub streak_count: u32,
    pub last_active_date: Option<NaiveDate>,
}

pub struct ProgressionService {
    store: Arc<dyn StateStore<ProgressionState>>,
    xp: XpConfig,
}

impl ProgressionService {
    pub fn new(store: Arc<dyn StateStore<ProgressionState>>, xp: XpConfig) -> Self {
        Self { store, xp }
    }

    /// Current state, created on first read
    pub async fn state(&self, user_id: &UserId) -> Result<ProgressionState> {
        load_or_create(self.store.as_ref(), user_id, || ProgressionState::new(user_id.clone())).await
    }

    pub async fn streak(&self, user_id: &UserId) -> Result<StreakSummary> {
        let state = self.state(user_id).await?;
        Ok(StreakSummary {
            streak_count: state.streak_count(),
            last_active_date: state.last_active_date(),
        })
    }

    /// Award `amount` XP for activity on `activity_date`
    pub async fn award_xp(&self, user_id: &UserId, amount: u64, activity_date: NaiveDate) -> Result<XpAward> {
        // state the committed update started from; the last attempt wins
        let previous = Mutex::new(None);
        let state = self
            .store
            .update(user_id, &|current| {
                let current = current.unwrap_or_else(|| ProgressionState::new(user_id.clone()));
                let next = current.award(amount, activity_date);
                if let Ok(mut slot) = previous.lock() {
                    *slot = Some(current);
                }
                Ok(next)
            })
            .await?;

        let leveled_up = previous
            .into_inner()
            .ok()
            .flatten()
            .map(|before| state.leveled_up_from(&before))
            .unwrap_or(false);
        if leveled_up {
            tracing::info!(user = %user_id, level = state.level(), "level up");
        }
        tracing::debug!(
            user = %user_id,
            amount,
            total_xp = state.total_xp(),
            streak = state.streak_count(),
            "xp awarded"
        );

        Ok(XpAward {
            xp_awarded: amount,
            state,
            leveled_up,
        })
    }

    /// Award the configured XP for a qualifying activity
    pub async fn record_activity(
        &self,
        user_id: &UserId,
        kind: ActivityKind,
        activity_date: NaiveDate,
    ) -> Result<XpAward> {
        let amount = match kind {
            ActivityKind::WeightLog => self.xp.weight_log,
            ActivityKind::WorkoutCompleted => self.xp.workout_completed,
        };
        self.award_xp(user_id, amount, activity_date).await
    }

    pub async fn achievements(&self, user_id: &UserId, stats: &ActivityStats) -> Result<Vec<Achievement>> {
        let state = self.state(user_id).await?;
        Ok(evaluate_achievements(&state, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::parse_activity_date;
    use coach_store::MemoryStore;

    fn service() -> ProgressionService {
        ProgressionService::new(Arc::new(MemoryStore::new()), XpConfig::default())
    }

    fn day(raw: &str) -> NaiveDate {
        parse_activity_date(raw).unwrap()
    }

    fn user(id: &str) -> UserId {
        id.parse().unwrap()
    }

    #[tokio::test]
    async fn test_state_created_lazily() {
        let service = service();
        let state = service.state(&user("new")).await.unwrap();
        assert_eq!(state, ProgressionState::new(user("new")));
    }

    #[tokio::test]
    async fn test_weight_logs_build_streak() {
        let service = service();
        let u = user("logger");

        let first = service.record_activity(&u, ActivityKind::WeightLog, day("2024-01-09")).await.unwrap();
        assert_eq!(first.state.total_xp(), 10);
        assert_eq!(first.state.streak_count(), 1);

        let second = service.record_activity(&u, ActivityKind::WeightLog, day("2024-01-10")).await.unwrap();
        assert_eq!(second.state.streak_count(), 2);

        let same_day = service.record_activity(&u, ActivityKind::WorkoutCompleted, day("2024-01-10")).await.unwrap();
        assert_eq!(same_day.state.total_xp(), 40);
        assert_eq!(same_day.state.streak_count(), 2);

        let after_gap = service.record_activity(&u, ActivityKind::WeightLog, day("2024-01-14")).await.unwrap();
        assert_eq!(after_gap.state.streak_count(), 1);

        let streak = service.streak(&u).await.unwrap();
        assert_eq!(streak.last_active_date, Some(day("2024-01-14")));
    }

    #[tokio::test]
    async fn test_level_up_reported() {
        let service = service();
        let u = user("climber");
        let award = service.award_xp(&u, 495, day("2024-01-01")).await.unwrap();
        assert!(!award.leveled_up);

        let award = service.award_xp(&u, 10, day("2024-01-02")).await.unwrap();
        assert!(award.leveled_up);
        assert_eq!(award.state.level(), 2);
    }

    #[tokio::test]
    async fn test_level_up_at_xp_ceiling() {
        let service = service();
        let u = user("maxed");
        let award = service.award_xp(&u, u64::MAX - 10, day("2024-01-01")).await.unwrap();
        assert!(award.leveled_up);

        // total clamps at u64::MAX, which is still the same level
        let award = service.award_xp(&u, 200, day("2024-01-02")).await.unwrap();
        assert_eq!(award.state.total_xp(), u64::MAX);
        assert!(!award.leveled_up);
    }

    #[tokio::test]
    async fn test_concurrent_awards_are_not_lost() {
        let service = Arc::new(service());
        let u = user("busy");

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let service = Arc::clone(&service);
                let u = u.clone();
                tokio::spawn(async move { service.award_xp(&u, 10, day("2024-03-01")).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let state = service.state(&u).await.unwrap();
        assert_eq!(state.total_xp(), 500);
        assert_eq!(state.level(), 2);
        assert_eq!(state.streak_count(), 1);
    }

    #[tokio::test]
    async fn test_achievements_follow_streak() {
        let service = service();
        let u = user("streaker");
        let start = day("2024-05-01");
        for offset in 0..7 {
            let date = start + chrono::Duration::days(offset);
            service.record_activity(&u, ActivityKind::WeightLog, date).await.unwrap();
        }

        let list = service.achievements(&u, &ActivityStats::default()).await.unwrap();
        assert!(list.iter().any(|a| a.id == "streak_7" && a.unlocked));
    }

    #[test]
    fn test_activity_parse() {
        assert_eq!("workout".parse::<ActivityKind>().unwrap(), ActivityKind::WorkoutCompleted);
        assert_eq!("weight-log".parse::<ActivityKind>().unwrap(), ActivityKind::WeightLog);
        assert!("nap".parse::<ActivityKind>().is_err());
    }
}
