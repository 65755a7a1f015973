//! # ap2-ledger — Append-Only Mandate Ledger
//!
//! The ledger is the single source of truth for every chain. It owns the
//! canonical copy of each committed [`ap2_mandate::Mandate`] and the
//! [`ap2_mandate::Transaction`] it carries, and it enforces the global
//! invariants on every commit regardless of what the caller's policy
//! decided:
//!
//! - identifiers are never reused (`mandate_id`, `vc_id`, `txn_id`);
//! - every `prev_refs` entry already exists, and all of them sit in one
//!   chain whose root is an Intent;
//! - each kind links to the right kind of parent, and a Payment's
//!   `cart_digest` matches its Cart;
//! - a chain holds at most one Cart, netting request, settlement, Payment
//!   and Refund, in lifecycle order;
//! - transactions match the mandate that carries them;
//! - amounts do not drift between Intent, Cart, Netting and Payment;
//! - refunds never exceed the payment they reverse, in the same currency;
//! - each kind comes from its configured issuer, proofs verify and
//!   validity windows contain the commit time.
//!
//! Storage sits behind [`AppendLog`]. [`MemoryLog`] keeps entries in process;
//! [`JsonlLog`] writes one JSON object per line and syncs after each append.
//! [`Ledger::open`] replays a log through the same checks.

pub mod audit;
pub mod error;
pub mod ledger;
pub mod log;

pub use audit::{AuditFinding, AuditReport};
pub use error::{LedgerError, LogError};
pub use ledger::Ledger;
pub use log::{AppendLog, JsonlLog, LedgerEntry, MemoryLog};
