//! # ap2-vc — Verifiable Credential Envelope
//!
//! Every mandate is carried inside a W3C Verifiable Credential. This crate
//! owns that envelope:
//!
//! - [`VerifiableCredential`]: the rigid envelope with an extensible
//!   `credentialSubject`.
//! - [`Proof`]: the Ed25519Signature2020 proof block.
//! - [`schema`]: validation of credentials against the bundled mandate
//!   schema, identified by [`MANDATE_SCHEMA_ID`].
//!
//! The signing input of a credential is its canonical form with `proof`
//! removed, so a credential exported from the ledger verifies on its own.

pub mod credential;
pub mod proof;
pub mod schema;

pub use credential::{CredentialSchemaRef, VcError, VerifiableCredential};
pub use proof::{Proof, ProofPurpose, ProofType};
pub use schema::{MandateSchema, SchemaError, Violation};

/// Versioned identifier of the mandate credential schema.
pub const MANDATE_SCHEMA_ID: &str = "https://ap2-protocol.org/schemas/mandate.v1.json";

/// JSON-LD contexts attached to every mandate credential.
pub const MANDATE_CONTEXTS: [&str; 3] = [
    "https://www.w3.org/2018/credentials/v1",
    "https://ap2-protocol.org/contexts/mandates/v1",
    "https://w3id.org/security/v2",
];
