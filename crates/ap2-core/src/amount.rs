//! # Monetary Amounts
//!
//! `Amount` is a signed fixed-point decimal with four fractional digits,
//! stored as an `i64` count of ten-thousandths. It serializes as a decimal
//! string (`"500.0"`, `"-500.0"`, `"0.0"`) because canonicalization rejects
//! floats.
//!
//! Floats are accepted once, at the request boundary, through
//! `TryFrom<f64>` or by deserializing a JSON number. After that every
//! comparison and sum is exact integer arithmetic, so refund totals and
//! consistency checks never drift.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of fractional decimal digits carried by [`Amount`].
pub const AMOUNT_SCALE_DIGITS: u32 = 4;

const SCALE: i64 = 10_000;

/// A signed fixed-point monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// From a raw count of ten-thousandths.
    pub const fn from_minor_units(units: i64) -> Self {
        Self(units)
    }

    /// From a whole number of major units.
    pub fn from_major(units: i64) -> Option<Self> {
        units.checked_mul(SCALE).map(Self)
    }

    /// Raw count of ten-thousandths.
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Whether this amount is exactly zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether this amount is strictly positive.
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Whether this amount is strictly negative.
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Checked negation.
    pub fn checked_neg(self) -> Option<Amount> {
        self.0.checked_neg().map(Self)
    }

    /// Absolute value, or `None` for `i64::MIN` units.
    pub fn checked_abs(self) -> Option<Amount> {
        self.0.checked_abs().map(Self)
    }

    fn invalid(value: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidAmount {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE.unsigned_abs();
        let whole = abs / scale;
        let frac = abs % scale;
        let digits = format!("{frac:04}");
        let trimmed = digits.trim_end_matches('0');
        let frac_str = if trimmed.is_empty() { "0" } else { trimmed };
        write!(f, "{sign}{whole}.{frac_str}")
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (whole_str, frac_str) = match body.split_once('.') {
            Some((w, fr)) => (w, fr),
            None => (body, ""),
        };
        if whole_str.is_empty() || !whole_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Self::invalid(s, "expected decimal digits before the point"));
        }
        if body.contains('.') && frac_str.is_empty() {
            return Err(Self::invalid(s, "expected digits after the decimal point"));
        }
        if !frac_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Self::invalid(s, "fractional part must be decimal digits"));
        }
        if frac_str.len() > AMOUNT_SCALE_DIGITS as usize {
            return Err(Self::invalid(
                s,
                format!("at most {AMOUNT_SCALE_DIGITS} fractional digits are supported"),
            ));
        }

        let overflow = || Self::invalid(s, "amount out of range");
        let whole: i64 = whole_str.parse().map_err(|_| overflow())?;
        let mut frac: i64 = 0;
        for (i, b) in frac_str.bytes().enumerate() {
            let digit = i64::from(b - b'0');
            frac += digit * 10_i64.pow(AMOUNT_SCALE_DIGITS - 1 - i as u32);
        }
        let units = whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(overflow)?;
        Ok(Self(if negative { -units } else { units }))
    }
}

impl TryFrom<f64> for Amount {
    type Error = ValidationError;

    /// Convert a float at the request boundary, rounding to four digits.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(Self::invalid(&value.to_string(), "amount must be finite"));
        }
        let scaled = (value * SCALE as f64).round();
        if scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return Err(Self::invalid(&value.to_string(), "amount out of range"));
        }
        Ok(Self(scaled as i64))
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> serde::de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or a JSON number")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Amount, E> {
                Amount::from_major(v).ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(Amount::from_major)
                    .ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Amount, E> {
                Amount::try_from(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// An ISO-4217-style currency code, normalized to uppercase.
///
/// Non-empty ASCII alphanumeric. The ledger treats codes as opaque labels;
/// it does not check them against a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a currency code, uppercasing it.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidCurrency`] for empty or non-alphanumeric input.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidCurrency(s));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// Access the code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}
