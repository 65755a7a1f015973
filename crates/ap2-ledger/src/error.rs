//! # Ledger Errors
//!
//! Every rejection names the offending identifiers. A rejected commit leaves
//! the ledger unchanged.

use std::path::PathBuf;

use ap2_core::{Amount, CurrencyCode, Timestamp, VcId};
use ap2_state::ChainError;
use thiserror::Error;

/// Errors from the append log.
#[derive(Error, Debug)]
pub enum LogError {
    /// Reading or writing the backing file failed.
    #[error("ledger log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry could not be encoded.
    #[error("failed to encode ledger entry {seq}: {source}")]
    Encode {
        seq: u64,
        #[source]
        source: serde_json::Error,
    },

    /// A stored line is not a ledger entry.
    #[error("corrupt ledger log line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Stored sequence numbers are not contiguous.
    #[error("ledger log out of order: expected sequence {expected}, found {found}")]
    OutOfOrder { expected: u64, found: u64 },
}

/// Errors from ledger commits and reads.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// An identifier is already in the ledger.
    #[error("duplicate {kind} {id}")]
    DuplicateIdentifier {
        /// `mandate_id`, `vc_id` or `txn_id`.
        kind: &'static str,
        id: String,
    },

    /// A `prev_refs` entry does not resolve to a committed mandate.
    #[error("mandate {vc_id} references unknown mandate {missing}")]
    DanglingReference { vc_id: VcId, missing: VcId },

    /// The mandate links to the wrong kind of parent, spans chains, or
    /// disagrees with its parents' identities.
    #[error("mandate {vc_id} has invalid linkage: {reason}")]
    InvalidLinkage { vc_id: VcId, reason: String },

    /// The mandate is a step its chain's lifecycle does not allow next,
    /// such as a second Payment or a Refund before any Payment.
    #[error("mandate {vc_id} is not allowed on chain {chain}: {source}")]
    Lifecycle {
        vc_id: VcId,
        chain: VcId,
        #[source]
        source: ChainError,
    },

    /// The transaction does not belong to the mandate, or violates its
    /// kind's sign rule.
    #[error("transaction for mandate {vc_id} is invalid: {reason}")]
    InvalidTransaction { vc_id: VcId, reason: String },

    /// Amount, currency or counterparty differ from the parent mandate.
    #[error("mandate {vc_id} drifts from {against}: {reason}")]
    AmountDrift {
        vc_id: VcId,
        against: VcId,
        reason: String,
    },

    /// Cumulative refunds would exceed the original payment.
    #[error(
        "refund of {requested} on payment {payment} exceeds original {original} \
         (already refunded {refunded})"
    )]
    RefundExceedsOriginal {
        payment: VcId,
        original: Amount,
        refunded: Amount,
        requested: Amount,
    },

    /// The mandate's currency differs from the payment it corrects.
    #[error("mandate {vc_id} is in {actual}, expected {expected}")]
    CurrencyMismatch {
        vc_id: VcId,
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    /// The mandate is unsigned or its proof does not verify.
    #[error("proof on mandate {vc_id} rejected: {reason}")]
    ProofRejected { vc_id: VcId, reason: String },

    /// The commit time is outside the mandate's validity window.
    #[error("mandate {vc_id} is not valid at {at} (expires {expiration})")]
    Expired {
        vc_id: VcId,
        at: Timestamp,
        expiration: Timestamp,
    },

    /// No mandate with this identifier.
    #[error("mandate {vc_id} not found")]
    NotFound { vc_id: VcId },

    /// The append log failed; nothing was committed.
    #[error(transparent)]
    Storage(#[from] LogError),

    /// A stored entry failed validation while the ledger was being opened.
    #[error("ledger replay failed at sequence {seq}: {source}")]
    Replay {
        seq: u64,
        #[source]
        source: Box<LedgerError>,
    },
}
