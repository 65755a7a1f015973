//! # Audit Export
//!
//! A chain leaves the process as an ordered list of signed W3C credentials
//! plus the transactions they authorized. Each credential carries its full
//! common fields and `prev_refs`, so the export can be re-verified without
//! access to the ledger: every proof against the issuer keys, and every
//! reference against an earlier credential in the same export.

use std::collections::HashSet;

use ap2_core::VcId;
use ap2_crypto::Ed25519PublicKey;
use ap2_vc::{MandateSchema, SchemaError, VcError, VerifiableCredential, MANDATE_SCHEMA_ID};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mandate::Mandate;
use crate::transaction::Transaction;

/// Errors from building or checking an export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// A chain export needs at least its root.
    #[error("cannot export an empty chain")]
    EmptyChain,

    /// The export declares a schema this build does not understand.
    #[error("unsupported export schema {0:?}")]
    UnsupportedSchema(String),

    /// A credential could not be produced or did not verify.
    #[error("credential {vc_id}: {source}")]
    Credential {
        vc_id: VcId,
        #[source]
        source: VcError,
    },

    /// A credential does not conform to the mandate schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A credential references something not exported before it.
    #[error("credential {vc_id} references {missing}, which does not precede it in the export")]
    DanglingReference { vc_id: VcId, missing: VcId },

    /// A credential subject is not shaped like a mandate subject.
    #[error("credential {vc_id} has a malformed subject: {reason}")]
    MalformedSubject { vc_id: VcId, reason: String },
}

/// One chain, ready for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainExport {
    /// Schema identifier every credential conforms to.
    pub schema: String,
    /// The chain's root Intent.
    pub root: VcId,
    /// Credentials in commit order.
    pub credentials: Vec<VerifiableCredential>,
    /// Transactions in commit order.
    pub transactions: Vec<Transaction>,
}

impl ChainExport {
    /// Export `mandates`, which must be in commit order starting at the root.
    pub fn build(mandates: &[Mandate], transactions: Vec<Transaction>) -> Result<Self, ExportError> {
        let root = mandates.first().ok_or(ExportError::EmptyChain)?.vc_id();
        let credentials = mandates
            .iter()
            .map(|m| {
                m.to_credential().map_err(|source| ExportError::Credential {
                    vc_id: m.vc_id(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            schema: MANDATE_SCHEMA_ID.to_string(),
            root,
            credentials,
            transactions,
        })
    }

    /// Validate every credential against the bundled schema.
    pub fn validate(&self, schema: &MandateSchema) -> Result<(), ExportError> {
        if self.schema != MANDATE_SCHEMA_ID {
            return Err(ExportError::UnsupportedSchema(self.schema.clone()));
        }
        for vc in &self.credentials {
            schema.validate_credential(vc)?;
        }
        Ok(())
    }

    /// Verify every proof and every back-reference.
    ///
    /// `resolve_key` maps a verification method to its public key, as in
    /// [`VerifiableCredential::verify`].
    pub fn verify<F>(&self, resolve_key: F) -> Result<(), ExportError>
    where
        F: Fn(&str) -> Result<Ed25519PublicKey, String>,
    {
        if self.credentials.first().map(|vc| vc.id) != Some(self.root) {
            return Err(ExportError::EmptyChain);
        }
        let mut seen: HashSet<VcId> = HashSet::new();
        for vc in &self.credentials {
            vc.verify(&resolve_key).map_err(|source| ExportError::Credential {
                vc_id: vc.id,
                source,
            })?;
            for parent in prev_refs_of(vc)? {
                if !seen.contains(&parent) {
                    return Err(ExportError::DanglingReference {
                        vc_id: vc.id,
                        missing: parent,
                    });
                }
            }
            seen.insert(vc.id);
        }
        Ok(())
    }
}

fn prev_refs_of(vc: &VerifiableCredential) -> Result<Vec<VcId>, ExportError> {
    let raw = vc
        .credential_subject
        .get("prev_refs")
        .cloned()
        .ok_or_else(|| ExportError::MalformedSubject {
            vc_id: vc.id,
            reason: "missing prev_refs".to_string(),
        })?;
    serde_json::from_value(raw).map_err(|e| ExportError::MalformedSubject {
        vc_id: vc.id,
        reason: e.to_string(),
    })
}
