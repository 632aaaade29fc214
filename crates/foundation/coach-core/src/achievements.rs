//! Achievement catalog.

use crate::progression::ProgressionState;
use serde::{Deserialize, Serialize};

/// Activity totals that are tracked outside the progression record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    /// Starting weight minus latest logged weight, in kg
    #[serde(default)]
    pub weight_lost_kg: f64,
    #[serde(default)]
    pub workouts_completed: u32,
    /// Longest run of consecutive days without added sugar
    #[serde(default)]
    pub sugar_free_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub label: String,
    pub unlocked: bool,
}

impl Achievement {
    fn new(id: &str, label: &str, unlocked: bool) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            unlocked,
        }
    }
}

/// Evaluate the full catalog, in display order
pub fn evaluate_achievements(progress: &ProgressionState, stats: &ActivityStats) -> Vec<Achievement> {
    vec![
        Achievement::new("streak_7", "7-day streak", progress.streak_count() >= 7),
        Achievement::new("first_2kg", "First 2kg lost", stats.weight_lost_kg >= 2.0),
        Achievement::new("workouts_30", "30 workouts completed", stats.workouts_completed >= 30),
        Achievement::new("no_sugar_week", "No sugar week", stats.sugar_free_days >= 7),
    ]
}
