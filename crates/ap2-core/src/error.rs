//! # Error Types
//!
//! Leaf-level errors shared by every crate in the workspace. Domain crates
//! define their own `thiserror` enums and wrap these with `#[from]`.
//!
//! - Validation errors name the offending value.
//! - Cryptographic errors fail loudly with full context.

use thiserror::Error;

/// A value failed validation at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Issuer identity is empty, contains whitespace, or contains `#`.
    #[error("invalid issuer identity: {0:?}")]
    InvalidIssuer(String),

    /// Party (counterparty/payer) identifier is empty.
    #[error("invalid party identifier: {0:?}")]
    InvalidParty(String),

    /// Currency code is empty or not ASCII alphanumeric.
    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Amount string could not be parsed as a fixed-point decimal.
    #[error("invalid amount {value:?}: {reason}")]
    InvalidAmount {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A vc id string was not of the form `urn:uuid:<uuid>`.
    #[error("invalid vc id: {0:?}")]
    InvalidVcId(String),

    /// A transaction id string was not of the form `txn-<uuid>`.
    #[error("invalid transaction id: {0:?}")]
    InvalidTxnId(String),

    /// Content digest string was not `sha256:<64 hex chars>`.
    #[error("invalid content digest: {0:?}")]
    InvalidDigest(String),

    /// Timestamp could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Validity window does not satisfy `expiration > issuance`.
    #[error("invalid validity window: expiration {expiration} is not after issuance {issuance}")]
    InvalidWindow {
        /// Window start.
        issuance: String,
        /// Window end.
        expiration: String,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be decimal strings.
    #[error("float values are not permitted in canonical representations; use a decimal string for amounts: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// Key generation or parsing failed.
    #[error("key error: {0}")]
    KeyError(String),
}
