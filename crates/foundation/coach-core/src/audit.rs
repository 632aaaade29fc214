//! Audit record for metered actions.

use crate::cost::TokenUsage;
use crate::credits::Credits;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of metered AI action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// 7-day workout and calorie plan
    WeeklyPlan,
    /// Plan adjustment from user feedback
    AdjustPlan,
    /// Free-form coaching chat
    Coach,
}

impl ActionKind {
    /// Only a weekly plan may be paid for with the one-time free allowance
    pub fn free_allowance_eligible(&self) -> bool {
        matches!(self, ActionKind::WeeklyPlan)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::WeeklyPlan => write!(f, "weekly_plan"),
            ActionKind::AdjustPlan => write!(f, "adjust_plan"),
            ActionKind::Coach => write!(f, "coach"),
        }
    }
}

/// One append-only record per completed metered action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub action_kind: ActionKind,
    /// Prompt as sent (free-form for coach chat, the action name otherwise)
    pub prompt: String,
    pub response_text: String,
    pub token_usage: Option<TokenUsage>,
    /// Cost computed from usage under the active policy
    pub cost: Credits,
    /// Credits actually taken from the balance; zero for subscribers and the
    /// free allowance, less than `cost` when the balance ran out
    #[serde(default)]
    pub charged: Credits,
    pub free_allowance: bool,
    /// Snapshot of the client context sent with the request
    #[serde(default)]
    pub context_snapshot: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(user_id: UserId, action_kind: ActionKind, response_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action_kind,
            prompt: action_kind.to_string(),
            response_text: response_text.into(),
            token_usage: None,
            cost: Credits::ZERO,
            charged: Credits::ZERO,
            free_allowance: false,
            context_snapshot: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn cost(mut self, cost: Credits) -> Self {
        self.cost = cost;
        self
    }

    pub fn charged(mut self, charged: Credits) -> Self {
        self.charged = charged;
        self
    }

    pub fn free_allowance(mut self, free: bool) -> Self {
        self.free_allowance = free;
        self
    }

    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context_snapshot = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let record = AuditRecord::new("u1".parse().unwrap(), ActionKind::AdjustPlan, "ok")
            .cost(Credits::whole(1));
        assert_eq!(record.prompt, "adjust_plan");
        assert_eq!(record.cost, Credits::whole(1));
        assert_eq!(record.charged, Credits::ZERO);
        assert!(!record.free_allowance);
        assert!(record.token_usage.is_none());
    }

    #[test]
    fn test_free_allowance_eligibility() {
        assert!(ActionKind::WeeklyPlan.free_allowance_eligible());
        assert!(!ActionKind::Coach.free_allowance_eligible());
        assert!(!ActionKind::AdjustPlan.free_allowance_eligible());
    }
}
