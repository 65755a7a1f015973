//! # ap2-processor — Payment Processor
//!
//! Orchestrates one payment operation end to end. For each step the
//! processor asks the [`ap2_state::ChainEngine`] whether the chain may move
//! and what the new mandate must link to, builds the mandate with the
//! [`ap2_mandate::MandateFactory`], signs it, and commits it together with
//! its transaction to the [`ap2_ledger::Ledger`].
//!
//! ```text
//! pay ──► Intent ──► Cart ──┬──────────────────────────────► Payment
//!                           └─► Netting(requested)
//!                                 │  settlement service
//!                                 ▼
//!                               Netting(settled) ─────────► Payment
//! refund ──► Refund     (links to the Payment)
//! flag   ──► FraudFlag  (links to any mandate of the chain)
//! ```
//!
//! Every step is its own commit. A failure stops the operation and leaves
//! the committed prefix in the ledger; nothing is rolled back.

pub mod config;
pub mod error;
pub mod processor;
pub mod request;
pub mod settlement;
pub mod summary;

pub use config::{ConfigError, ProcessorConfig};
pub use error::{ErrorKind, ProcessorError};
pub use processor::PaymentProcessor;
pub use request::{FraudRequest, PayRequest, RefundRequest};
pub use settlement::{
    ImmediateSettlement, NettingOutcome, NettingRequest, SettlementError, SettlementService,
};
pub use summary::{ChainStep, ChainSummary};
