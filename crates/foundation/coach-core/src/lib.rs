//! # Coach Core
//!
//! Pure progression and credit accounting for the coaching backend.
//!
//! ```text
//!   weight log / workout ──> award XP ──> level = xp / 500 + 1
//!                                    └──> streak (count, last day)
//!
//!   AI request ──> gate (can_consume) ──> gateway ──> cost(usage) ──> consume
//! ```
//!
//! Everything in this crate is synchronous and side-effect free. Storage,
//! locking and the AI gateway live in the data, runtime and integration tiers.

pub mod achievements;
pub mod audit;
pub mod cost;
pub mod credits;
pub mod ledger;
pub mod level;
pub mod progression;
pub mod streak;
pub mod types;

pub use achievements::{evaluate_achievements, Achievement, ActivityStats};
pub use audit::{ActionKind, AuditRecord};
pub use cost::{CostPolicy, TokenUsage};
pub use credits::Credits;
pub use ledger::{can_consume, consume, CreditAccount, SubscriptionStatus};
pub use level::{level_for_xp, level_progress, xp_to_next_level, XP_PER_LEVEL};
pub use progression::ProgressionState;
pub use streak::{days_between, next_streak, parse_activity_date};
pub use types::UserId;

/// Result type for coach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by every tier of the coach workspace
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Credits exhausted: need {needed}, have {available}")]
    CreditsExhausted { needed: Credits, available: Credits },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code, used in CLI JSON output and logs
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "invalid_payload",
            Error::NotFound(_) => "not_found",
            Error::CreditsExhausted { .. } => "out_of_credits",
            Error::UpstreamUnavailable(_) => "upstream_unavailable",
            Error::RateLimited { .. } => "rate_limited",
            Error::Store(_) => "store_error",
            Error::Config(_) => "config_error",
        }
    }

    /// Business denials are surfaced to the user and never retried
    pub fn is_denial(&self) -> bool {
        matches!(self, Error::CreditsExhausted { .. } | Error::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::CreditsExhausted {
            needed: Credits::whole(1),
            available: Credits::ZERO,
        };
        assert_eq!(err.code(), "out_of_credits");
        assert!(err.is_denial());
        assert_eq!(err.to_string(), "Credits exhausted: need 1, have 0");

        let err = Error::UpstreamUnavailable("gateway down".into());
        assert_eq!(err.code(), "upstream_unavailable");
        assert!(!err.is_denial());
    }
}
