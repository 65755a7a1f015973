//! # ap2-mandate — Mandates and Their Transactions
//!
//! A payment is tracked as a chain of mandates. This crate defines:
//!
//! - [`Mandate`] and the closed set of subjects in [`MandateSubject`]:
//!   Intent, Cart, Netting, Payment, Refund, FraudFlag.
//! - [`Transaction`], the monetary record a mandate may carry.
//! - [`MandateFactory`], which validates subjects and allocates identities
//!   but never decides whether a mandate is currently allowed.
//! - [`Signer`] / [`Verifier`] and the Ed25519 [`KeyRing`].
//! - [`ChainExport`], the versioned audit export.
//!
//! Mandates are immutable once signed. The only mutation is attaching the
//! proof, exactly once.

pub mod export;
pub mod factory;
pub mod mandate;
pub mod signing;
pub mod transaction;

pub use export::{ChainExport, ExportError};
pub use factory::{FactoryError, IssuerDirectory, MandateFactory};
pub use mandate::{
    CartSubject, FraudFlagSubject, IntentSubject, Mandate, MandateKind, MandateSubject,
    NettingPhase, NettingSubject, PaymentSubject, RefundSubject,
};
pub use signing::{sign_mandate, KeyRing, Signer, SigningError, Verifier};
pub use transaction::{Transaction, TransactionKind};
