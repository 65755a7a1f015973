//! # Proof Types
//!
//! The proof block attached to a mandate credential. Its structure is rigid:
//! the bundled schema sets `additionalProperties: false`, so nothing can be
//! smuggled into a proof.

use std::fmt;

use ap2_core::{IssuerId, Timestamp};
use serde::{Deserialize, Serialize};

/// Fragment appended to an issuer identity to name its signing key.
pub const KEY_FRAGMENT: &str = "keys-1";

/// The type of cryptographic proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofType {
    /// Ed25519 signature over the JCS-canonical credential body.
    Ed25519Signature2020,
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofType::Ed25519Signature2020 => f.write_str("Ed25519Signature2020"),
        }
    }
}

/// Proof purpose vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    /// The issuer asserts the credential claims.
    AssertionMethod,
}

/// A proof on a mandate credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Proof {
    /// The proof type.
    #[serde(rename = "type")]
    pub proof_type: ProofType,

    /// When the proof was created.
    pub created: Timestamp,

    /// `<issuer>#keys-1`.
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,

    /// Always `assertionMethod`.
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: ProofPurpose,

    /// Hex-encoded Ed25519 signature (128 hex characters).
    #[serde(rename = "proofValue")]
    pub proof_value: String,
}

impl Proof {
    /// An Ed25519Signature2020 assertion proof.
    pub fn new_ed25519(verification_method: String, proof_value: String, created: Timestamp) -> Self {
        Self {
            proof_type: ProofType::Ed25519Signature2020,
            created,
            verification_method,
            proof_purpose: ProofPurpose::AssertionMethod,
            proof_value,
        }
    }

    /// The verification method naming `issuer`'s signing key.
    pub fn verification_method_for(issuer: &IssuerId) -> String {
        format!("{issuer}#{KEY_FRAGMENT}")
    }

    /// The issuer part of the verification method, if it has the
    /// `<issuer>#<fragment>` shape.
    pub fn controller(&self) -> Option<&str> {
        self.verification_method
            .split_once('#')
            .map(|(controller, _)| controller)
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Proof {
        Proof::new_ed25519(
            "issuer:merchant#keys-1".to_string(),
            "ab".repeat(64),
            Timestamp::parse("2026-03-01T10:00:00Z").unwrap(),
        )
    }

    #[test]
    fn field_names_are_w3c_camel_case() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["type"], "Ed25519Signature2020");
        assert_eq!(v["verificationMethod"], "issuer:merchant#keys-1");
        assert_eq!(v["proofPurpose"], "assertionMethod");
        assert_eq!(v["created"], "2026-03-01T10:00:00Z");
        assert!(v.get("proof_value").is_none());
    }

    #[test]
    fn unknown_fields_rejected() {
        let mut v = serde_json::to_value(sample()).unwrap();
        v["extra"] = serde_json::json!("x");
        assert!(serde_json::from_value::<Proof>(v).is_err());
    }

    #[test]
    fn verification_method_and_controller() {
        let issuer = IssuerId::new("issuer:processor").unwrap();
        let vm = Proof::verification_method_for(&issuer);
        assert_eq!(vm, "issuer:processor#keys-1");
        let mut p = sample();
        p.verification_method = vm;
        assert_eq!(p.controller(), Some("issuer:processor"));
        p.verification_method = "no-fragment".to_string();
        assert_eq!(p.controller(), None);
    }
}
