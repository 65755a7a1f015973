//! # Identity Newtypes
//!
//! Each identifier kind in the ledger is its own type. A `MandateId` is the
//! mandate's business identity; a `VcId` is the identity of the credential
//! envelope that carries it and is what `prev_refs` point at. Mixing the two
//! is a type error.
//!
//! ## Wire Forms
//!
//! | Type        | Display / serde form     |
//! |-------------|--------------------------|
//! | `MandateId` | bare UUID                |
//! | `VcId`      | `urn:uuid:<uuid>`        |
//! | `TxnId`     | `txn-<uuid>`             |
//! | `IssuerId`  | validated string         |
//! | `PartyId`   | validated string         |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Serde deserialization that routes through the validating constructor,
/// so invalid values cannot enter via JSON.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Serde serialization through `Display`.
macro_rules! impl_display_serialize {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

// ─── UUID-based identifiers ─────────────────────────────────────────

/// Business identity of a mandate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MandateId(Uuid);

impl MandateId {
    /// Create a new random mandate identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MandateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MandateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MandateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

const VC_ID_PREFIX: &str = "urn:uuid:";

/// Identity of a verifiable-credential envelope, rendered `urn:uuid:<uuid>`.
///
/// This is the key used by `prev_refs` and by the ledger's primary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VcId(Uuid);

impl VcId {
    /// Create a new random vc identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VcId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{VC_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for VcId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(VC_ID_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidVcId(s.to_string()))
    }
}

impl_display_serialize!(VcId);
impl_validating_deserialize!(VcId);

const TXN_ID_PREFIX: &str = "txn-";

/// Identity of a derived transaction, rendered `txn-<uuid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Create a new random transaction identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TXN_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for TxnId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(TXN_ID_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTxnId(s.to_string()))
    }
}

impl_display_serialize!(TxnId);
impl_validating_deserialize!(TxnId);

// ─── String-based identifiers ───────────────────────────────────────

/// Identity of a mandate issuer, e.g. `issuer:merchant`.
///
/// Non-empty, no whitespace, no `#` (the fragment separator of a
/// verification method such as `issuer:merchant#keys-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IssuerId(String);

impl IssuerId {
    /// Create an issuer identity, validating format.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidIssuer`] for empty input, whitespace, or `#`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '#') {
            return Err(ValidationError::InvalidIssuer(s));
        }
        Ok(Self(s))
    }

    /// An issuer identity known at compile time.
    ///
    /// Intended for the built-in role defaults; the literal must satisfy the
    /// same rules as [`IssuerId::new`].
    pub fn from_static(value: &'static str) -> Self {
        debug_assert!(
            !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c == '#'),
            "invalid static issuer identity {value:?}"
        );
        Self(value.to_string())
    }

    /// Access the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssuerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IssuerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl_validating_deserialize!(IssuerId);

/// A payer, receiver, or counterparty identifier.
///
/// Free-form (`merchant-1`, `CNY`, `payer-001`) but never empty or blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Create a party identifier.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidParty`] for empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.trim().is_empty() {
            return Err(ValidationError::InvalidParty(s));
        }
        Ok(Self(s))
    }

    /// A party identifier known at compile time, for configuration defaults.
    pub fn from_static(value: &'static str) -> Self {
        debug_assert!(!value.trim().is_empty(), "blank static party identifier");
        Self(value.to_string())
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PartyId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl_validating_deserialize!(PartyId);
