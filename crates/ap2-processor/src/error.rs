//! # Processor Errors
//!
//! [`ProcessorError`] keeps the failing component's own error as its
//! source. [`ProcessorError::kind`] flattens it into the one taxonomy
//! callers branch on.

use std::fmt;

use ap2_core::VcId;
use ap2_ledger::LedgerError;
use ap2_mandate::{FactoryError, MandateKind, SigningError};
use ap2_state::ChainError;
use ap2_vc::VcError;
use serde::Serialize;
use thiserror::Error;

use crate::settlement::SettlementError;

/// Errors from processor operations. Every one is terminal for the
/// operation; nothing is retried.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// The chain's state does not allow the step.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The mandate could not be built.
    #[error(transparent)]
    Factory(#[from] FactoryError),

    /// The ledger refused or failed the commit or read.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    /// A mandate could not be rendered as a credential for digesting.
    #[error(transparent)]
    Credential(#[from] VcError),

    /// The settlement run did not complete.
    #[error("netting for chain {chain} failed: {source}")]
    Settlement {
        chain: VcId,
        #[source]
        source: SettlementError,
    },

    /// The mandate a refund names is not a Payment.
    #[error("mandate {vc_id} is a {kind}, not a payment")]
    NotAPayment { vc_id: VcId, kind: MandateKind },
}

/// Flat classification of [`ProcessorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    NettingPending,
    InvalidSubject,
    DuplicateIdentifier,
    DanglingReference,
    RefundExceedsOriginal,
    CurrencyMismatch,
    NotFound,
    InvalidLinkage,
    InvalidTransaction,
    AmountDrift,
    Expired,
    ProofRejected,
    Storage,
    Settlement,
    Signing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTransition => "invalid_transition",
            Self::NettingPending => "netting_pending",
            Self::InvalidSubject => "invalid_subject",
            Self::DuplicateIdentifier => "duplicate_identifier",
            Self::DanglingReference => "dangling_reference",
            Self::RefundExceedsOriginal => "refund_exceeds_original",
            Self::CurrencyMismatch => "currency_mismatch",
            Self::NotFound => "not_found",
            Self::InvalidLinkage => "invalid_linkage",
            Self::InvalidTransaction => "invalid_transaction",
            Self::AmountDrift => "amount_drift",
            Self::Expired => "expired",
            Self::ProofRejected => "proof_rejected",
            Self::Storage => "storage",
            Self::Settlement => "settlement",
            Self::Signing => "signing",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProcessorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Chain(e) => chain_kind(e),
            Self::Factory(_) => ErrorKind::InvalidSubject,
            Self::Ledger(e) => ledger_kind(e),
            Self::Signing(_) | Self::Credential(_) => ErrorKind::Signing,
            Self::Settlement { .. } => ErrorKind::Settlement,
            Self::NotAPayment { .. } => ErrorKind::NotFound,
        }
    }
}

fn chain_kind(e: &ChainError) -> ErrorKind {
    match e {
        ChainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        ChainError::NettingPending { .. } => ErrorKind::NettingPending,
        ChainError::NotInChain { .. } => ErrorKind::NotFound,
        ChainError::EmptyChain | ChainError::NoChain { .. } | ChainError::UnexpectedLinkage { .. } => {
            ErrorKind::InvalidLinkage
        }
    }
}

fn ledger_kind(e: &LedgerError) -> ErrorKind {
    match e {
        LedgerError::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
        LedgerError::DanglingReference { .. } => ErrorKind::DanglingReference,
        LedgerError::InvalidLinkage { .. } => ErrorKind::InvalidLinkage,
        LedgerError::Lifecycle { source, .. } => chain_kind(source),
        LedgerError::InvalidTransaction { .. } => ErrorKind::InvalidTransaction,
        LedgerError::AmountDrift { .. } => ErrorKind::AmountDrift,
        LedgerError::RefundExceedsOriginal { .. } => ErrorKind::RefundExceedsOriginal,
        LedgerError::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
        LedgerError::ProofRejected { .. } => ErrorKind::ProofRejected,
        LedgerError::Expired { .. } => ErrorKind::Expired,
        LedgerError::NotFound { .. } => ErrorKind::NotFound,
        LedgerError::Storage(_) => ErrorKind::Storage,
        LedgerError::Replay { source, .. } => ledger_kind(source),
    }
}
