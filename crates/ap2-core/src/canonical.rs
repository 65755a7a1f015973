//! # Canonical Serialization
//!
//! `CanonicalBytes` is the sole construction path for bytes that are signed
//! or hashed anywhere in the ledger. A mandate's proof is computed over the
//! canonical form of its body; a verifier recomputes the same bytes from the
//! stored record. Two serializations of the same logical mandate must
//! therefore be byte-identical.
//!
//! ## Rules
//!
//! 1. **Reject floats.** Amounts are fixed-point decimal strings. A float
//!    anywhere in the tree is a bug upstream and fails canonicalization.
//! 2. **Sorted keys, compact separators** via `serde_jcs` (RFC 8785).
//! 3. Timestamps arrive already normalized by [`crate::Timestamp`]
//!    (UTC, `Z` suffix, seconds precision).

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization with float rejection.
///
/// The inner buffer is private; the only constructors are
/// [`CanonicalBytes::new`] and [`CanonicalBytes::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if serde cannot render it.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Canonicalize an already-built JSON value.
    ///
    /// Used by the signing path, which removes the `proof` member from the
    /// value tree before canonicalizing.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
    }
}
