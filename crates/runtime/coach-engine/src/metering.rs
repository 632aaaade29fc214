//! Metered AI actions.
//!
//! One run: rate limit, take the user's lock, check the free allowance or the
//! balance gate, call the gateway, charge, audit. The lock is held from the
//! balance check until the charge is written. A failed gateway call charges
//! nothing and writes no audit record.

use crate::locks::KeyedLocks;
use coach_ai::{prompts, AiGateway, AiRequest};
use coach_core::{
    ActionKind, AuditRecord, CostPolicy, CreditAccount, Credits, Error, Result, SubscriptionStatus,
    TokenUsage, UserId,
};
use coach_ratelimit::RateLimiter;
use coach_store::{AuditSink, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A metered request, with the client context sent alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeteredAction {
    WeeklyPlan {
        #[serde(default)]
        context: serde_json::Value,
        goal: String,
        #[serde(default)]
        preferences: Vec<String>,
    },
    AdjustPlan {
        #[serde(default)]
        context: serde_json::Value,
        feedback: String,
    },
    Coach {
        #[serde(default)]
        context: serde_json::Value,
        message: String,
    },
}

impl MeteredAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            MeteredAction::WeeklyPlan { .. } => ActionKind::WeeklyPlan,
            MeteredAction::AdjustPlan { .. } => ActionKind::AdjustPlan,
            MeteredAction::Coach { .. } => ActionKind::Coach,
        }
    }

    pub fn context(&self) -> &serde_json::Value {
        match self {
            MeteredAction::WeeklyPlan { context, .. }
            | MeteredAction::AdjustPlan { context, .. }
            | MeteredAction::Coach { context, .. } => context,
        }
    }

    fn validate(&self) -> Result<()> {
        let (field, value) = match self {
            MeteredAction::WeeklyPlan { goal, .. } => ("goal", goal),
            MeteredAction::AdjustPlan { feedback, .. } => ("feedback", feedback),
            MeteredAction::Coach { message, .. } => ("message", message),
        };
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("{} must not be empty", field)));
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        match self {
            MeteredAction::WeeklyPlan { goal, preferences, .. } => prompts::weekly_plan(goal, preferences),
            MeteredAction::AdjustPlan { feedback, .. } => prompts::adjust_plan(feedback),
            MeteredAction::Coach { message, .. } => message.trim().to_string(),
        }
    }

    /// Prompt stored in the audit log: chat text for coach, the action name otherwise
    fn audit_prompt(&self) -> String {
        match self {
            MeteredAction::Coach { message, .. } => message.trim().to_string(),
            other => other.kind().to_string(),
        }
    }
}

/// What the caller gets back from a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteredOutcome {
    pub action_kind: ActionKind,
    pub text: String,
    pub usage: Option<TokenUsage>,
    /// Cost computed from usage under the active policy
    pub cost: Credits,
    /// Credits actually taken from the balance
    pub charged: Credits,
    pub free_allowance: bool,
    pub balance: Credits,
    pub subscription_status: SubscriptionStatus,
    /// False if the audit record could not be written
    pub audited: bool,
}

pub struct MeteringService {
    accounts: Arc<dyn StateStore<CreditAccount>>,
    gateway: Arc<dyn AiGateway>,
    audit: Arc<dyn AuditSink>,
    limiter: Option<Arc<RateLimiter>>,
    policy: CostPolicy,
    locks: KeyedLocks,
}

impl MeteringService {
    pub fn new(
        accounts: Arc<dyn StateStore<CreditAccount>>,
        gateway: Arc<dyn AiGateway>,
        audit: Arc<dyn AuditSink>,
        policy: CostPolicy,
    ) -> Self {
        Self {
            accounts,
            gateway,
            audit,
            limiter: None,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn policy(&self) -> CostPolicy {
        self.policy
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    pub async fn run(&self, user_id: &UserId, action: MeteredAction) -> Result<MeteredOutcome> {
        action.validate()?;
        let kind = action.kind();

        if let Some(limiter) = &self.limiter {
            limiter.check(user_id.as_str())?;
        }

        let _guard = self.locks.lock(user_id).await;

        let account = self
            .accounts
            .load(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no credit account for user {}", user_id)))?;

        let free_allowance = kind.free_allowance_eligible() && account.free_plan_available();
        let gate = self.policy.gate();
        if !free_allowance && !account.can_consume(gate) {
            tracing::warn!(user = %user_id, action = %kind, balance = %account.credits, "out of credits");
            return Err(Error::CreditsExhausted {
                needed: gate,
                available: account.credits,
            });
        }

        let request = AiRequest::coaching(action.context().clone(), action.prompt());
        let response = self.gateway.complete(&request).await.map_err(|e| {
            tracing::warn!(user = %user_id, action = %kind, gateway = self.gateway.name(), error = %e, "AI call failed");
            e
        })?;

        let cost = self.policy.cost(response.usage.as_ref());
        // what the committed update actually did; the last attempt wins
        let applied = Mutex::new(Settlement::default());
        let account = self
            .accounts
            .update(user_id, &|current| {
                let current = current
                    .ok_or_else(|| Error::NotFound(format!("no credit account for user {}", user_id)))?;
                // another instance may have spent the allowance since the load
                let (next, settlement) = if free_allowance && current.free_plan_available() {
                    (current.mark_free_plan_used(), Settlement::free())
                } else {
                    let next = current.consume(cost);
                    let charged = current.credits.saturating_sub(next.credits);
                    (next, Settlement::charged(charged))
                };
                if let Ok(mut slot) = applied.lock() {
                    *slot = settlement;
                }
                Ok(next)
            })
            .await?;
        let Settlement {
            free_allowance,
            charged,
        } = applied.into_inner().unwrap_or_default();

        let record = AuditRecord::new(user_id.clone(), kind, response.text.clone())
            .prompt(action.audit_prompt())
            .usage(response.usage)
            .cost(cost)
            .charged(charged)
            .free_allowance(free_allowance)
            .context(action.context().clone());
        let audited = match self.audit.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user = %user_id, action = %kind, error = %e, "audit append failed");
                false
            }
        };

        tracing::info!(
            user = %user_id,
            action = %kind,
            %cost,
            %charged,
            free_allowance,
            audited,
            balance = %account.credits,
            "metered action completed"
        );

        Ok(MeteredOutcome {
            action_kind: kind,
            text: response.text,
            usage: response.usage,
            cost,
            charged,
            free_allowance,
            balance: account.credits,
            subscription_status: account.subscription_status,
            audited,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Settlement {
    free_allowance: bool,
    charged: Credits,
}

impl Settlement {
    fn free() -> Self {
        Self {
            free_allowance: true,
            charged: Credits::ZERO,
        }
    }

    fn charged(charged: Credits) -> Self {
        Self {
            free_allowance: false,
            charged,
        }
    }
}
