//! Credit ledger.
//!
//! Subscribers (`active`) are unmetered; everyone else spends credits.
//! Consumption clamps at zero and never raises a balance.

use crate::credits::Credits;
use crate::types::UserId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing state, driven by the external billing collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Active,
    Expired,
    Canceled,
}

impl SubscriptionStatus {
    /// Whether actions for this status are charged against the balance
    pub fn is_metered(&self) -> bool {
        !matches!(self, SubscriptionStatus::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Free => write!(f, "free"),
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Expired => write!(f, "expired"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(SubscriptionStatus::Free),
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            other => Err(Error::Validation(format!("unknown subscription status '{}'", other))),
        }
    }
}

/// Per-user credit account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: UserId,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    pub credits: Credits,
    /// One-time flag: the first AI-generated plan is free
    #[serde(default)]
    pub free_plan_used: bool,
}

impl CreditAccount {
    /// New free-tier account with a starting balance
    pub fn new(user_id: UserId, initial_credits: Credits) -> Self {
        Self {
            user_id,
            subscription_status: SubscriptionStatus::Free,
            credits: initial_credits,
            free_plan_used: false,
        }
    }

    pub fn can_consume(&self, amount: Credits) -> bool {
        can_consume(self, amount)
    }

    pub fn consume(&self, amount: Credits) -> Self {
        consume(self, amount)
    }

    pub fn free_plan_available(&self) -> bool {
        !self.free_plan_used
    }

    /// Flip the free-plan flag. Only ever goes false -> true.
    pub fn mark_free_plan_used(&self) -> Self {
        Self {
            free_plan_used: true,
            ..self.clone()
        }
    }
}

/// Whether `account` may spend `amount`
pub fn can_consume(account: &CreditAccount, amount: Credits) -> bool {
    if !account.subscription_status.is_metered() {
        return true;
    }
    account.credits >= amount
}

/// Account after spending `amount`. Subscribers are left untouched.
pub fn consume(account: &CreditAccount, amount: Credits) -> CreditAccount {
    if !account.subscription_status.is_metered() {
        return account.clone();
    }
    CreditAccount {
        credits: account.credits.saturating_sub(amount),
        ..account.clone()
    }
}
