//! # Consistency Report
//!
//! [`crate::Ledger::audit`] re-runs the commit checks over one chain's stored
//! entries, in order, and totals its money movements. A healthy chain has no
//! findings.

use ap2_core::{Amount, VcId};
use serde::Serialize;

/// One stored entry that no longer passes the commit checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFinding {
    pub seq: u64,
    pub vc_id: VcId,
    pub problem: String,
}

/// Result of auditing one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub root: VcId,
    /// Mandates in the chain.
    pub entries: usize,
    pub consistent: bool,
    pub findings: Vec<AuditFinding>,
    /// Sum of payment transactions.
    pub paid: Amount,
    /// Sum of refund magnitudes.
    pub refunded: Amount,
    /// `paid - refunded`.
    pub net: Amount,
    pub fraud_flags: usize,
}
