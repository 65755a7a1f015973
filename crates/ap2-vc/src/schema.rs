//! # Mandate Credential Schema
//!
//! The bundled JSON Schema (Draft 2020-12) for exported mandate credentials.
//! The schema is compiled into the binary with `include_str!` so validation
//! never touches the filesystem or the network.
//!
//! Exports are validated before they leave the process: a credential that
//! does not match the versioned schema is a bug in the exporter.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::credential::VerifiableCredential;

const MANDATE_SCHEMA_SOURCE: &str = include_str!("../schemas/mandate.v1.schema.json");

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the instance.
    pub instance_path: String,
    /// JSON pointer into the schema.
    pub schema_path: String,
    /// Validator message.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.instance_path.is_empty() { "/" } else { &self.instance_path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Errors from schema loading and validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The bundled schema is not valid JSON.
    #[error("bundled mandate schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The bundled schema could not be compiled.
    #[error("bundled mandate schema failed to compile: {0}")]
    Build(String),

    /// The instance does not conform.
    #[error("credential {subject} violates the mandate schema: {}", join(.violations))]
    Invalid {
        /// Credential id, or `<document>` when unknown.
        subject: String,
        /// Every violation found.
        violations: Vec<Violation>,
    },
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compiled validator for the mandate credential schema.
///
/// `Send + Sync`; compile once and share.
pub struct MandateSchema {
    validator: jsonschema::Validator,
}

impl fmt::Debug for MandateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MandateSchema")
            .field("id", &crate::MANDATE_SCHEMA_ID)
            .finish()
    }
}

impl MandateSchema {
    /// Compile the bundled schema.
    pub fn load() -> Result<Self, SchemaError> {
        let schema: Value = serde_json::from_str(MANDATE_SCHEMA_SOURCE)?;
        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        let validator = opts
            .build(&schema)
            .map_err(|e| SchemaError::Build(e.to_string()))?;
        Ok(Self { validator })
    }

    /// The raw schema document.
    pub fn source() -> &'static str {
        MANDATE_SCHEMA_SOURCE
    }

    /// Validate an arbitrary JSON document.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaError> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(instance)
            .map(|e| Violation {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if violations.is_empty() {
            return Ok(());
        }
        let subject = instance
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<document>")
            .to_string();
        Err(SchemaError::Invalid { subject, violations })
    }

    /// Validate a credential.
    pub fn validate_credential(&self, vc: &VerifiableCredential) -> Result<(), SchemaError> {
        let instance = serde_json::to_value(vc)?;
        self.validate(&instance)
    }
}
