//! Exact decimal numbers for prices and amounts.
//!
//! [`Decimal`] wraps [`rust_decimal::Decimal`] and keeps it normalized at all
//! times, so that equal values share one representation: `"0.10"` and `"0.1"`
//! are the same number, `"-0"` is plain zero, and the canonical string never
//! carries trailing zeros or exponent notation.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecimalError;

/// Decimal literal grammar: optional sign, digits with an optional point,
/// optional exponent suffix.
static LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<sign>[+-])?(?P<int>\d*)(?:\.(?P<frac>\d*))?(?:[eE](?P<exp>[+-]?\d+))?$")
        .expect("decimal literal regex is valid")
});

/// Largest power of ten that fits in an `i128`.
const MAX_POW10: u32 = 38;

/// Largest scale `rust_decimal` can carry.
const MAX_SCALE: i64 = 28;

/// Exact decimal number with value-based equality and ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(rust_decimal::Decimal);

impl Decimal {
    /// Zero.
    pub const ZERO: Self = Self(rust_decimal::Decimal::ZERO);

    /// One.
    pub const ONE: Self = Self(rust_decimal::Decimal::ONE);

    /// Parse a decimal literal such as `"0.0291"`, `"-12"`, or `"1e-8"`.
    pub fn parse(literal: &str) -> Result<Self, DecimalError> {
        let invalid = || DecimalError::Parse(literal.to_string());
        let caps = LITERAL.captures(literal).ok_or_else(invalid)?;

        let int = caps.name("int").map_or("", |m| m.as_str());
        let frac = caps.name("frac").map_or("", |m| m.as_str());
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }

        let exp: i64 = match caps.name("exp") {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 0,
        };

        let digits = format!("{int}{frac}");
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(Self::ZERO);
        }

        let significant = digits.trim_end_matches('0');
        let exponent = exp
            .checked_sub(frac.len() as i64)
            .and_then(|e| e.checked_add((digits.len() - significant.len()) as i64))
            .ok_or(DecimalError::Overflow)?;

        let mut coefficient: i128 = significant.parse().map_err(|_| DecimalError::Overflow)?;
        if caps.name("sign").map(|m| m.as_str()) == Some("-") {
            coefficient = -coefficient;
        }

        Self::from_parts(coefficient, exponent)
    }

    /// `1 x 10^exponent`, e.g. `unit(-8)` is `0.00000001`.
    pub fn unit(exponent: i64) -> Result<Self, DecimalError> {
        Self::from_parts(1, exponent)
    }

    /// Build `coefficient * 10^exponent`.
    fn from_parts(coefficient: i128, exponent: i64) -> Result<Self, DecimalError> {
        if coefficient == 0 {
            return Ok(Self::ZERO);
        }

        let inner = if exponent >= 0 {
            let value = coefficient
                .checked_mul(pow10(exponent)?)
                .ok_or(DecimalError::Overflow)?;
            rust_decimal::Decimal::try_from_i128_with_scale(value, 0)
        } else {
            let scale = -exponent;
            if scale > MAX_SCALE {
                return Err(DecimalError::Overflow);
            }
            rust_decimal::Decimal::try_from_i128_with_scale(coefficient, scale as u32)
        }
        .map_err(|_| DecimalError::Overflow)?;

        Ok(Self::from(inner))
    }

    /// Split into an unpadded coefficient and the exponent of its last digit,
    /// so that `self == coefficient * 10^exponent`.
    fn parts(&self) -> (i128, i64) {
        let mut coefficient = self.0.mantissa();
        let mut exponent = -(self.0.scale() as i64);
        if coefficient == 0 {
            return (0, 0);
        }
        while coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        (coefficient, exponent)
    }

    /// Significant digits without leading or trailing zero padding.
    pub fn digits(&self) -> String {
        self.parts().0.unsigned_abs().to_string()
    }

    /// Exponent of the most significant digit (`0.1` is -1, `10` is 1).
    /// Zero reports 0.
    pub fn exponent(&self) -> i64 {
        let (coefficient, exponent) = self.parts();
        if coefficient == 0 {
            return 0;
        }
        exponent + coefficient.unsigned_abs().to_string().len() as i64 - 1
    }

    /// If this is exactly `1 x 10^k`, return `k`.
    pub fn unit_power_of_ten(&self) -> Option<i64> {
        match self.parts() {
            (1, exponent) => Some(exponent),
            _ => None,
        }
    }

    /// Round to a multiple of `10^exponent`, moving away from zero whenever
    /// any discarded digit is non-zero.
    ///
    /// `1.1` rounded at exponent 0 is `2`, and `-1.1` is `-2`. Values already
    /// exact at that exponent are returned unchanged.
    pub fn round(&self, exponent: i64) -> Result<Self, DecimalError> {
        let (_, lowest) = self.parts();
        if self.is_zero() || lowest >= exponent {
            return Ok(*self);
        }

        let mantissa = self.0.mantissa();
        let shift = self.0.scale() as i64 + exponent;
        let quotient = if shift > MAX_POW10 as i64 {
            // Every digit is discarded: one unit at the target exponent.
            mantissa.signum()
        } else {
            let divisor = pow10(shift)?;
            let mut quotient = mantissa / divisor;
            if mantissa % divisor != 0 {
                quotient += mantissa.signum();
            }
            quotient
        };

        Self::from_parts(quotient, exponent)
    }

    /// Divide by an integer scale factor, failing unless the result is exact.
    pub fn div_scale(&self, divisor: u64) -> Result<Self, DecimalError> {
        let inexact = || DecimalError::Inexact {
            value: self.to_string(),
            divisor,
        };
        if divisor == 0 {
            return Err(inexact());
        }

        let divisor_dec = rust_decimal::Decimal::from(divisor);
        let quotient = self.0.checked_div(divisor_dec).ok_or_else(inexact)?;
        if quotient.checked_mul(divisor_dec) != Some(self.0) {
            return Err(inexact());
        }
        Ok(Self::from(quotient))
    }

    /// Exact addition.
    pub fn checked_add(&self, other: &Self) -> Result<Self, DecimalError> {
        self.0
            .checked_add(other.0)
            .map(Self::from)
            .ok_or(DecimalError::Overflow)
    }

    /// Whether this is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether this is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

/// `10^exponent` as an `i128`.
fn pow10(exponent: i64) -> Result<i128, DecimalError> {
    if !(0..=MAX_POW10 as i64).contains(&exponent) {
        return Err(DecimalError::Overflow);
    }
    Ok(10_i128.pow(exponent as u32))
}

impl From<rust_decimal::Decimal> for Decimal {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self(value.normalize())
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Self(rust_decimal::Decimal::from(value))
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        Self::parse(&literal).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn digits_and_exponent_locate_most_significant_digit() {
        for (literal, exponent) in [("0.1", -1), ("0.01", -2), ("1e-8", -8), ("10", 1), ("1e8", 8)] {
            let n = d(literal);
            assert_eq!(n.digits(), "1", "{literal}");
            assert_eq!(n.exponent(), exponent, "{literal}");
        }

        let n = d("0.0291111");
        assert_eq!(n.exponent(), -2);
        assert_eq!(-n.exponent() + n.digits().len() as i64 - 1, 7);

        let n = d("29111.99");
        assert_eq!(n.exponent(), 4);
        assert_eq!(-n.exponent() + n.digits().len() as i64 - 1, 2);
    }

    #[test]
    fn zero_is_canonical() {
        for literal in ["0", "0.00", "00.0", "-0", "-0.0", "0e5"] {
            assert_eq!(d(literal).to_string(), "0", "{literal}");
            assert_eq!(d(literal), Decimal::ZERO);
        }
    }

    #[test]
    fn trailing_zeros_and_exponents_are_dropped() {
        for literal in ["0.1", "0.10", "0.100", "1e-1", "10e-2", ".1"] {
            assert_eq!(d(literal).to_string(), "0.1", "{literal}");
        }
        assert_eq!(d("1e2").to_string(), "100");
        assert_eq!(d("1E-8").to_string(), "0.00000001");
        assert_eq!(d("-12.500").to_string(), "-12.5");
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(d("0.10"), d("0.1"));
        assert_eq!(d("100"), d("1e2"));
        assert!(d("0.11") > d("0.1"));
        assert!(d("-1") < d("0"));
    }

    #[test]
    fn rejects_malformed_literals() {
        for literal in ["", ".", "-", "abc", "1.2.3", "1e", "1_000", "0x10", " 1", "1e-"] {
            assert!(
                matches!(Decimal::parse(literal), Err(DecimalError::Parse(_))),
                "{literal:?} should not parse"
            );
        }
    }

    #[test]
    fn round_moves_away_from_zero_when_lossy() {
        assert_eq!(d("1.1").round(0).unwrap().to_string(), "2");
        assert_eq!(d("1.1").round(-1).unwrap().to_string(), "1.1");
        assert_eq!(d("-1.1").round(0).unwrap().to_string(), "-2");
        assert_eq!(d("0.101").round(-1).unwrap().to_string(), "0.2");
        assert_eq!(d("0.1").round(-1).unwrap().to_string(), "0.1");
        assert_eq!(d("123").round(1).unwrap().to_string(), "130");
        assert_eq!(d("0.0001").round(2).unwrap().to_string(), "100");
        assert_eq!(Decimal::ZERO.round(3).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn unit_power_of_ten_detection() {
        assert_eq!(d("0.1").unit_power_of_ten(), Some(-1));
        assert_eq!(d("1").unit_power_of_ten(), Some(0));
        assert_eq!(d("100").unit_power_of_ten(), Some(2));
        assert_eq!(d("1e-8").unit_power_of_ten(), Some(-8));
        assert_eq!(d("2").unit_power_of_ten(), None);
        assert_eq!(d("0.15").unit_power_of_ten(), None);
        assert_eq!(d("-1").unit_power_of_ten(), None);
        assert_eq!(Decimal::ZERO.unit_power_of_ten(), None);
    }

    #[test]
    fn div_scale_is_exact() {
        let amount = Decimal::from(150_000_000u64).div_scale(100_000_000).unwrap();
        assert_eq!(amount.to_string(), "1.5");
        assert_eq!(Decimal::from(1u64).div_scale(100_000_000).unwrap(), d("1e-8"));
        assert!(matches!(
            Decimal::from(1u64).div_scale(3),
            Err(DecimalError::Inexact { .. })
        ));
        assert!(Decimal::ONE.div_scale(0).is_err());
    }

    #[test]
    fn addition_is_exact() {
        assert_eq!(d("0.1").checked_add(&d("0.2")).unwrap(), d("0.3"));
        assert_eq!(d("1.5").checked_add(&d("-1.5")).unwrap().to_string(), "0");
    }

    #[test]
    fn converts_from_rust_decimal_normalized() {
        assert_eq!(Decimal::from(dec!(0.500)).to_string(), "0.5");
        assert_eq!(Decimal::from(dec!(-0.0)), Decimal::ZERO);
    }

    #[test]
    fn serializes_as_canonical_string() {
        let json = serde_json::to_string(&d("0.100")).unwrap();
        assert_eq!(json, "\"0.1\"");
        let back: Decimal = serde_json::from_str("\"1e-1\"").unwrap();
        assert_eq!(back, d("0.1"));
        assert!(serde_json::from_str::<Decimal>("\"nope\"").is_err());
    }
}
