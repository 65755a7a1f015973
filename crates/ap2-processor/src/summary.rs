//! # Chain Summary
//!
//! What an operation hands back for audit display: every committed step of
//! the chain with its identities, links and transaction.

use ap2_core::{IssuerId, MandateId, Timestamp, VcId};
use ap2_ledger::LedgerEntry;
use ap2_mandate::{MandateKind, Transaction};
use ap2_state::{ChainState, ChainStatus};
use serde::Serialize;

/// One committed mandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStep {
    pub seq: u64,
    pub kind: MandateKind,
    pub vc_id: VcId,
    pub mandate_id: MandateId,
    pub issuer: IssuerId,
    pub prev_refs: Vec<VcId>,
    pub expiration: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

impl From<&LedgerEntry> for ChainStep {
    fn from(entry: &LedgerEntry) -> Self {
        let m = &entry.mandate;
        Self {
            seq: entry.seq,
            kind: m.kind(),
            vc_id: m.vc_id(),
            mandate_id: m.mandate_id(),
            issuer: m.issuer().clone(),
            prev_refs: m.prev_refs().to_vec(),
            expiration: m.window().expiration(),
            transaction: entry.transaction.clone(),
        }
    }
}

/// A chain as it stands after an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub root: VcId,
    pub state: ChainState,
    /// Commit order.
    pub steps: Vec<ChainStep>,
}

impl ChainSummary {
    pub(crate) fn new(status: &ChainStatus, entries: &[LedgerEntry]) -> Self {
        Self {
            root: status.root(),
            state: status.state(),
            steps: entries.iter().map(ChainStep::from).collect(),
        }
    }

    /// The latest step of `kind`.
    pub fn last_of(&self, kind: MandateKind) -> Option<&ChainStep> {
        self.steps.iter().rev().find(|s| s.kind == kind)
    }

    /// The most recent step.
    pub fn head(&self) -> Option<&ChainStep> {
        self.steps.last()
    }

    pub fn kinds(&self) -> Vec<MandateKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.steps.iter().filter_map(|s| s.transaction.as_ref())
    }
}
