//! # ap2-state — Payment Chain State Machine
//!
//! A chain is keyed by its root Intent and moves through a fixed, closed set
//! of states:
//!
//! ```text
//! (none) ──intent──▶ INTENT ──cart──▶ CART ──payment──▶ PAYMENT ──refund──▶ REFUNDED
//!                                      │                   ▲
//!                                      └─netting─▶ NETTING_PENDING ─settled─▶ NETTING_DONE
//! ```
//!
//! A fraud flag may be raised against any mandate of an existing chain. It
//! leaves the lifecycle stage untouched; the reported state becomes
//! `FRAUD_FLAGGED`.
//!
//! The engine holds no state of its own. [`ChainStatus::replay`] derives the
//! status from the chain's committed mandates, and [`ChainEngine::plan`]
//! decides whether an event is allowed and which predecessors the new
//! mandate must reference.

pub mod chain;
pub mod engine;

pub use chain::{ChainError, ChainEvent, ChainStage, ChainState, ChainStatus};
pub use engine::{ChainEngine, Plan};
