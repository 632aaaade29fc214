//! Credit service: account lifecycle, balance checks, billing events.

use coach_core::{CreditAccount, Credits, Error, Result, SubscriptionStatus, UserId};
use coach_store::{load_or_create, StateStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Largest balance an operator may grant in one `set_credits`
pub const MAX_GRANT: Credits = Credits::whole(10_000);

/// Subscription change reported by the billing provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingEvent {
    Activated,
    Canceled,
    Expired,
}

impl BillingEvent {
    /// Webhook payloads carry a single cancellation flag
    pub fn from_webhook(is_canceled: bool) -> Self {
        if is_canceled {
            BillingEvent::Canceled
        } else {
            BillingEvent::Activated
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        match self {
            BillingEvent::Activated => SubscriptionStatus::Active,
            BillingEvent::Canceled => SubscriptionStatus::Canceled,
            BillingEvent::Expired => SubscriptionStatus::Expired,
        }
    }
}

impl fmt::Display for BillingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingEvent::Activated => write!(f, "activated"),
            BillingEvent::Canceled => write!(f, "canceled"),
            BillingEvent::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for BillingEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "activated" | "active" | "renewed" => Ok(BillingEvent::Activated),
            "canceled" | "cancelled" => Ok(BillingEvent::Canceled),
            "expired" => Ok(BillingEvent::Expired),
            other => Err(Error::Validation(format!("unknown billing event '{}'", other))),
        }
    }
}

pub struct CreditService {
    store: Arc<dyn StateStore<CreditAccount>>,
    default_credits: Credits,
}

impl CreditService {
    pub fn new(store: Arc<dyn StateStore<CreditAccount>>, default_credits: Credits) -> Self {
        Self { store, default_credits }
    }

    pub fn default_credits(&self) -> Credits {
        self.default_credits
    }

    /// Account for `user_id`, created with the default balance on first read
    pub async fn account(&self, user_id: &UserId) -> Result<CreditAccount> {
        load_or_create(self.store.as_ref(), user_id, || {
            CreditAccount::new(user_id.clone(), self.default_credits)
        })
        .await
    }

    /// False for unknown users
    pub async fn can_consume(&self, user_id: &UserId, amount: Credits) -> Result<bool> {
        Ok(self
            .store
            .load(user_id)
            .await?
            .map(|account| account.can_consume(amount))
            .unwrap_or(false))
    }

    /// Spend `amount`, clamping at zero. Subscribers are not charged.
    pub async fn consume(&self, user_id: &UserId, amount: Credits) -> Result<CreditAccount> {
        let account = self
            .store
            .update(user_id, &|current| Ok(existing(current, user_id)?.consume(amount)))
            .await?;
        tracing::debug!(user = %user_id, %amount, balance = %account.credits, "credits consumed");
        Ok(account)
    }

    pub async fn mark_free_plan_used(&self, user_id: &UserId) -> Result<CreditAccount> {
        self.store
            .update(user_id, &|current| Ok(existing(current, user_id)?.mark_free_plan_used()))
            .await
    }

    /// Set the billing status, creating the account if billing reaches us first
    pub async fn set_subscription_status(
        &self,
        user_id: &UserId,
        status: SubscriptionStatus,
    ) -> Result<CreditAccount> {
        let account = self
            .store
            .update(user_id, &|current| {
                let mut account =
                    current.unwrap_or_else(|| CreditAccount::new(user_id.clone(), self.default_credits));
                account.subscription_status = status;
                Ok(account)
            })
            .await?;
        tracing::info!(user = %user_id, %status, "subscription status updated");
        Ok(account)
    }

    /// Operator override of the balance; accepts 1..=10000 credits
    pub async fn set_credits(&self, user_id: &UserId, credits: Credits) -> Result<CreditAccount> {
        if credits < Credits::whole(1) || credits > MAX_GRANT {
            return Err(Error::Validation(format!(
                "credits must be between 1 and {}, got {}",
                MAX_GRANT, credits
            )));
        }

        let account = self
            .store
            .update(user_id, &|current| {
                let mut account =
                    current.unwrap_or_else(|| CreditAccount::new(user_id.clone(), self.default_credits));
                account.credits = credits;
                Ok(account)
            })
            .await?;
        tracing::info!(user = %user_id, %credits, "credits set");
        Ok(account)
    }

    pub async fn apply_billing_event(&self, user_id: &UserId, event: BillingEvent) -> Result<CreditAccount> {
        tracing::info!(user = %user_id, %event, "billing event");
        self.set_subscription_status(user_id, event.status()).await
    }
}

fn existing(current: Option<CreditAccount>, user_id: &UserId) -> Result<CreditAccount> {
    current.ok_or_else(|| Error::NotFound(format!("no credit account for user {}", user_id)))
}
