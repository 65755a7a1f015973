//! # Temporal Types — UTC-Only Timestamps and Validity Windows
//!
//! `Timestamp` is UTC, truncated to whole seconds, and always renders as
//! `YYYY-MM-DDTHH:MM:SSZ`. Two records describing the same instant produce
//! the same canonical bytes, which keeps mandate proofs stable.
//!
//! `ValidityWindow` is the `[issuance, expiration)` interval carried by every
//! mandate. Expiration is strictly after issuance.
//!
//! ## Security Invariant
//!
//! Non-UTC inputs are **rejected at construction**. `+00:00` is rejected too,
//! so there is exactly one textual form per instant.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// From a Unix epoch timestamp in seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimestamp(format!("epoch seconds out of range: {secs}")))
    }

    /// Parse an RFC 3339 string with a `Z` suffix.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidTimestamp`] if the string is not RFC 3339
    /// or uses any offset other than `Z`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::InvalidTimestamp(format!(
                "timestamp must use Z suffix (UTC only), got {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| ValidationError::InvalidTimestamp(format!("{s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This instant shifted forward by `secs` seconds, saturating at the
    /// far end of chrono's range.
    pub fn plus_secs(&self, secs: i64) -> Self {
        let shifted = Duration::try_seconds(secs)
            .and_then(|d| self.0.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self(truncate_to_seconds(shifted))
    }

    /// Render as ISO 8601 with `Z` suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl FromStr for Timestamp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// A half-open `[issuance, expiration)` validity interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ValidityWindow {
    issuance: Timestamp,
    expiration: Timestamp,
}

impl ValidityWindow {
    /// Build a window.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidWindow`] unless `expiration > issuance`.
    pub fn new(issuance: Timestamp, expiration: Timestamp) -> Result<Self, ValidationError> {
        if expiration <= issuance {
            return Err(ValidationError::InvalidWindow {
                issuance: issuance.to_iso8601(),
                expiration: expiration.to_iso8601(),
            });
        }
        Ok(Self { issuance, expiration })
    }

    /// A window of `ttl_secs` seconds starting at `issuance`.
    pub fn starting_at(issuance: Timestamp, ttl_secs: u64) -> Result<Self, ValidationError> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self::new(issuance, issuance.plus_secs(ttl))
    }

    /// Start of the window (inclusive).
    pub fn issuance(&self) -> Timestamp {
        self.issuance
    }

    /// End of the window (exclusive).
    pub fn expiration(&self) -> Timestamp {
        self.expiration
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.issuance <= at && at < self.expiration
    }
}

impl<'de> Deserialize<'de> for ValidityWindow {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            issuance: Timestamp,
            expiration: Timestamp,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.issuance, raw.expiration).map_err(serde::de::Error::custom)
    }
}
