//! Fixed-point credit amounts.
//!
//! Credits are fractional (a short coaching reply may cost 0.01), so the
//! balance is kept as an integer count of 1/10 000 credit units. One token
//! under the fractional policy is exactly one unit, which keeps billing
//! arithmetic exact and the balance unable to go negative.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DECIMALS: usize = 4;

/// A non-negative credit amount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credits(u64);

impl Credits {
    /// Units per whole credit
    pub const UNITS_PER_CREDIT: u64 = 10_000;

    pub const ZERO: Credits = Credits(0);

    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn whole(credits: u64) -> Self {
        Self(credits.saturating_mul(Self::UNITS_PER_CREDIT))
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert a decimal amount (e.g. from YAML config), rounding to the nearest unit
    pub fn from_decimal(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Validation(format!(
                "credit amount must be a finite non-negative number, got {}",
                value
            )));
        }
        let units = (value * Self::UNITS_PER_CREDIT as f64).round();
        if units > u64::MAX as f64 {
            return Err(Error::Validation(format!("credit amount too large: {}", value)));
        }
        Ok(Self(units as u64))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::UNITS_PER_CREDIT as f64
    }

    /// Subtract, clamping at zero
    pub const fn saturating_sub(self, other: Credits) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub const fn saturating_add(self, other: Credits) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_mul(self, factor: u64) -> Self {
        Self(self.0.saturating_mul(factor))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::UNITS_PER_CREDIT;
        let frac = self.0 % Self::UNITS_PER_CREDIT;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:0width$}", frac, width = DECIMALS);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl FromStr for Credits {
    type Err = Error;

    /// Parse an exact decimal such as `"10"`, `"0.1"` or `"2.0005"`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(format!("invalid credit amount '{}'", s));
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > DECIMALS {
            return Err(Error::Validation(format!(
                "credit amount '{}' has more than {} decimal places",
                s, DECIMALS
            )));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let frac_units: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = DECIMALS);
            padded.parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(Self::UNITS_PER_CREDIT)
            .and_then(|u| u.checked_add(frac_units))
            .map(Self)
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_trims_fraction() {
        assert_eq!(Credits::whole(10).to_string(), "10");
        assert_eq!(Credits::from_units(1_000).to_string(), "0.1");
        assert_eq!(Credits::from_units(500).to_string(), "0.05");
        assert_eq!(Credits::from_units(20_005).to_string(), "2.0005");
    }

    #[test]
    fn test_parse_exact_decimals() {
        assert_eq!("0.1".parse::<Credits>().unwrap(), Credits::from_units(1_000));
        assert_eq!("10".parse::<Credits>().unwrap(), Credits::whole(10));
        assert_eq!(".5".parse::<Credits>().unwrap(), Credits::from_units(5_000));
        assert!("0.00001".parse::<Credits>().is_err());
        assert!("-1".parse::<Credits>().is_err());
        assert!("abc".parse::<Credits>().is_err());
        assert!(".".parse::<Credits>().is_err());
    }

    #[test]
    fn test_from_decimal() {
        assert_eq!(Credits::from_decimal(0.1).unwrap(), Credits::from_units(1_000));
        assert_eq!(Credits::from_decimal(10.0).unwrap(), Credits::whole(10));
        assert!(Credits::from_decimal(-0.5).is_err());
        assert!(Credits::from_decimal(f64::NAN).is_err());
    }

    #[test]
    fn test_saturating_sub_never_negative() {
        let balance = Credits::from_units(50);
        assert_eq!(balance.saturating_sub(Credits::from_units(100)), Credits::ZERO);
    }
}
