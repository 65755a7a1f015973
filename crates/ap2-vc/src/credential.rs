//! # Verifiable Credential Structure, Signing, and Verification
//!
//! ## Security Invariants
//!
//! - **Signing** canonicalizes the credential with `proof` removed via
//!   [`CanonicalBytes::from_value()`] and signs those bytes. There is no
//!   other signing path.
//! - **Verification** recomputes the same canonical bytes from the stored
//!   credential and checks the signature against the key resolved from the
//!   proof's verification method.
//! - A proof is attached once. Attaching a second proof is an error, so a
//!   committed credential is never re-signed.

use ap2_core::{CanonicalBytes, IssuerId, Timestamp, VcId};
use ap2_crypto::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proof::{Proof, ProofType};

/// Errors from credential signing and verification.
#[derive(Error, Debug)]
pub enum VcError {
    /// Canonicalization of the credential body failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] ap2_core::CanonicalizationError),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The credential already carries a proof.
    #[error("credential {vc_id} is already signed")]
    AlreadySigned {
        /// The credential.
        vc_id: VcId,
    },

    /// The credential has no proof.
    #[error("credential {vc_id} has no proof")]
    MissingProof {
        /// The credential.
        vc_id: VcId,
    },

    /// The proof's verification method does not name the credential issuer.
    #[error("verification method {verification_method:?} is not controlled by issuer {issuer}")]
    IssuerMismatch {
        /// Credential issuer.
        issuer: IssuerId,
        /// Verification method on the proof.
        verification_method: String,
    },

    /// The verification method could not be resolved to a key.
    #[error("cannot resolve verification method {verification_method:?}: {reason}")]
    UnresolvedKey {
        /// Verification method on the proof.
        verification_method: String,
        /// Resolver message.
        reason: String,
    },

    /// The proof value is not a well-formed signature.
    #[error("invalid proof value: {0}")]
    InvalidProofValue(String),

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
}

/// Reference to the schema a credential conforms to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialSchemaRef {
    /// Schema URI.
    pub id: String,
    /// Validator type.
    #[serde(rename = "type")]
    pub schema_type: String,
}

impl CredentialSchemaRef {
    /// The bundled mandate schema.
    pub fn mandate_v1() -> Self {
        Self {
            id: crate::MANDATE_SCHEMA_ID.to_string(),
            schema_type: "JsonSchema".to_string(),
        }
    }
}

/// A W3C Verifiable Credential carrying one mandate.
///
/// The envelope is rigid (`deny_unknown_fields`); `credential_subject` is an
/// arbitrary JSON object and must not contain floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifiableCredential {
    /// JSON-LD context URIs.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// `urn:uuid:` credential identifier.
    pub id: VcId,

    /// Credential types, `VerifiableCredential` first.
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,

    /// Issuing party.
    pub issuer: IssuerId,

    /// Start of validity.
    #[serde(rename = "issuanceDate")]
    pub issuance_date: Timestamp,

    /// End of validity (exclusive).
    #[serde(rename = "expirationDate")]
    pub expiration_date: Timestamp,

    /// Versioned schema reference.
    #[serde(rename = "credentialSchema")]
    pub credential_schema: CredentialSchemaRef,

    /// The mandate payload.
    #[serde(rename = "credentialSubject")]
    pub credential_subject: serde_json::Value,

    /// Proof, absent until signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiableCredential {
    /// Canonical bytes of the credential with `proof` removed.
    pub fn signing_input(&self) -> Result<CanonicalBytes, VcError> {
        let mut val = serde_json::to_value(self)?;
        if let Some(obj) = val.as_object_mut() {
            obj.remove("proof");
        }
        Ok(CanonicalBytes::from_value(val)?)
    }

    /// The most specific credential type, e.g. `PaymentMandate`.
    pub fn mandate_type(&self) -> Option<&str> {
        self.credential_type.last().map(String::as_str)
    }

    /// Attach a proof produced elsewhere.
    ///
    /// # Errors
    ///
    /// [`VcError::AlreadySigned`] if a proof is already present.
    pub fn attach_proof(&mut self, proof: Proof) -> Result<(), VcError> {
        if self.proof.is_some() {
            return Err(VcError::AlreadySigned { vc_id: self.id });
        }
        self.proof = Some(proof);
        Ok(())
    }

    /// Sign with an Ed25519 key under the issuer's verification method.
    pub fn sign_ed25519(&mut self, key: &Ed25519KeyPair, created: Timestamp) -> Result<(), VcError> {
        if self.proof.is_some() {
            return Err(VcError::AlreadySigned { vc_id: self.id });
        }
        let canonical = self.signing_input()?;
        let signature = key.sign(&canonical);
        self.proof = Some(Proof::new_ed25519(
            Proof::verification_method_for(&self.issuer),
            signature.to_hex(),
            created,
        ));
        Ok(())
    }

    /// Verify the proof.
    ///
    /// `resolve_key` maps a verification method to the public key that
    /// controls it. The verification method must belong to the credential
    /// issuer.
    pub fn verify<F>(&self, resolve_key: F) -> Result<(), VcError>
    where
        F: Fn(&str) -> Result<Ed25519PublicKey, String>,
    {
        let proof = self
            .proof
            .as_ref()
            .ok_or(VcError::MissingProof { vc_id: self.id })?;

        match proof.proof_type {
            ProofType::Ed25519Signature2020 => {}
        }

        if proof.controller() != Some(self.issuer.as_str()) {
            return Err(VcError::IssuerMismatch {
                issuer: self.issuer.clone(),
                verification_method: proof.verification_method.clone(),
            });
        }

        let key = resolve_key(&proof.verification_method).map_err(|reason| VcError::UnresolvedKey {
            verification_method: proof.verification_method.clone(),
            reason,
        })?;

        let signature = Ed25519Signature::from_hex(&proof.proof_value)
            .map_err(|e| VcError::InvalidProofValue(e.to_string()))?;

        let canonical = self.signing_input()?;
        ap2_crypto::verify_with_public_key(&canonical, &signature, &key)
            .map_err(|e| VcError::VerificationFailed(e.to_string()))
    }
}
