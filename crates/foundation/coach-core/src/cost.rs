//! Cost of a metered action from the gateway's reported token usage.

use crate::credits::Credits;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tokens billed per whole credit
pub const TOKENS_PER_CREDIT: u64 = 10_000;

/// Token usage as reported by the AI gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    pub fn total(total_tokens: u64) -> Self {
        Self {
            total_tokens: Some(total_tokens),
            ..Self::default()
        }
    }

    /// Total tokens, if reported and non-zero. A zero total is treated as unknown.
    pub fn known_total(&self) -> Option<u64> {
        self.total_tokens.filter(|t| *t > 0)
    }
}

/// How token usage turns into a credit charge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPolicy {
    /// `max(0.01, tokens / 10000)`; unknown usage costs 0.1
    #[default]
    Fractional,
    /// `max(1, ceil(tokens / 10000))`; unknown usage costs 1
    WholeCredits,
}

impl CostPolicy {
    /// Minimum charge for a response with known usage
    pub fn floor(&self) -> Credits {
        match self {
            CostPolicy::Fractional => Credits::from_units(Credits::UNITS_PER_CREDIT / 100),
            CostPolicy::WholeCredits => Credits::whole(1),
        }
    }

    /// Charge when the gateway reports no usage
    pub fn unknown_usage_cost(&self) -> Credits {
        match self {
            CostPolicy::Fractional => Credits::from_units(Credits::UNITS_PER_CREDIT / 10),
            CostPolicy::WholeCredits => Credits::whole(1),
        }
    }

    /// Balance a caller must hold before a metered action may start
    pub fn gate(&self) -> Credits {
        self.unknown_usage_cost()
    }

    pub fn cost(&self, usage: Option<&TokenUsage>) -> Credits {
        let Some(total) = usage.and_then(TokenUsage::known_total) else {
            return self.unknown_usage_cost();
        };

        let charge = match self {
            // one token == one unit (1/10000 credit)
            CostPolicy::Fractional => Credits::from_units(total),
            CostPolicy::WholeCredits => Credits::whole(total.div_ceil(TOKENS_PER_CREDIT)),
        };
        charge.max(self.floor())
    }
}

impl fmt::Display for CostPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostPolicy::Fractional => write!(f, "fractional"),
            CostPolicy::WholeCredits => write!(f, "whole_credits"),
        }
    }
}

impl FromStr for CostPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fractional" => Ok(CostPolicy::Fractional),
            "whole_credits" | "whole" | "integer" => Ok(CostPolicy::WholeCredits),
            other => Err(Error::Validation(format!("unknown cost policy '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credits(raw: &str) -> Credits {
        raw.parse().unwrap()
    }

    #[test]
    fn test_fractional_unknown_usage() {
        let policy = CostPolicy::Fractional;
        assert_eq!(policy.cost(None), credits("0.1"));
        assert_eq!(policy.cost(Some(&TokenUsage::default())), credits("0.1"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(0))), credits("0.1"));
    }

    #[test]
    fn test_fractional_scales_with_tokens() {
        let policy = CostPolicy::Fractional;
        assert_eq!(policy.cost(Some(&TokenUsage::total(5_000))), credits("0.5"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(10_000))), credits("1"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(1))), credits("0.01"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(123_456))), credits("12.3456"));
    }

    #[test]
    fn test_whole_credits_rounds_up() {
        let policy = CostPolicy::WholeCredits;
        assert_eq!(policy.cost(None), credits("1"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(1))), credits("1"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(10_000))), credits("1"));
        assert_eq!(policy.cost(Some(&TokenUsage::total(10_001))), credits("2"));
    }

    #[test]
    fn test_only_total_tokens_counts() {
        let usage = TokenUsage {
            input_tokens: Some(9_000),
            output_tokens: Some(9_000),
            total_tokens: None,
        };
        assert_eq!(CostPolicy::Fractional.cost(Some(&usage)), credits("0.1"));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("whole-credits".parse::<CostPolicy>().unwrap(), CostPolicy::WholeCredits);
        assert_eq!("Fractional".parse::<CostPolicy>().unwrap(), CostPolicy::Fractional);
        assert!("flat".parse::<CostPolicy>().is_err());
    }
}
