//! # Ledger
//!
//! Commit validation runs in a fixed order, and the first failure wins:
//!
//! 1. identifier uniqueness
//! 2. reference resolution
//! 3. linkage shape
//! 4. lifecycle: the chain's committed mandates plus the candidate replay
//!    through the state machine
//! 5. transaction shape
//! 6. amount drift against the parent
//! 7. refund conservation
//! 8. currency against the payment being corrected
//! 9. issuer fixed for the mandate kind
//! 10. proof
//! 11. validity window
//!
//! Only then is the entry appended to the log, and only after the append
//! succeeds is it indexed. Reads take the shared lock and never see a
//! half-applied commit.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ap2_core::{Amount, IdentityProvider, MandateId, Timestamp, TxnId, VcId};
use ap2_mandate::{
    IssuerDirectory, Mandate, MandateKind, MandateSubject, NettingPhase, Transaction,
    TransactionKind, Verifier,
};
use ap2_state::{ChainError, ChainStatus};
use parking_lot::RwLock;

use crate::audit::{AuditFinding, AuditReport};
use crate::error::{LedgerError, LogError};
use crate::log::{AppendLog, LedgerEntry, MemoryLog};

// ─── Index ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Index {
    entries: Vec<LedgerEntry>,
    by_vc: HashMap<VcId, usize>,
    mandate_ids: HashSet<MandateId>,
    txn_ids: HashSet<TxnId>,
    root_of: HashMap<VcId, VcId>,
    chains: HashMap<VcId, Vec<usize>>,
}

impl Index {
    fn next_seq(&self) -> u64 {
        self.entries.len() as u64 + 1
    }

    fn get(&self, vc_id: &VcId) -> Option<&LedgerEntry> {
        self.by_vc.get(vc_id).and_then(|&i| self.entries.get(i))
    }

    fn chain(&self, root: &VcId) -> impl Iterator<Item = &LedgerEntry> {
        self.chains
            .get(root)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.entries.get(i))
    }

    /// `vc_id` and everything it transitively references, in commit order.
    fn ancestors(&self, vc_id: &VcId) -> Vec<&LedgerEntry> {
        let mut visited: HashSet<VcId> = HashSet::new();
        let mut stack = vec![*vc_id];
        let mut found = Vec::new();
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            if let Some(entry) = self.get(&next) {
                stack.extend(entry.mandate.prev_refs().iter().copied());
                found.push(entry);
            }
        }
        found.sort_by_key(|e| e.seq);
        found
    }

    fn insert(&mut self, entry: LedgerEntry, root: VcId) {
        let idx = self.entries.len();
        let vc_id = entry.mandate.vc_id();
        self.by_vc.insert(vc_id, idx);
        self.mandate_ids.insert(entry.mandate.mandate_id());
        if let Some(txn) = &entry.transaction {
            self.txn_ids.insert(txn.txn_id);
        }
        self.root_of.insert(vc_id, root);
        self.chains.entry(root).or_default().push(idx);
        self.entries.push(entry);
    }
}

// ─── Validation ─────────────────────────────────────────────────────

struct Checks<'a> {
    issuers: &'a IssuerDirectory,
    verifier: Option<&'a dyn Verifier>,
    /// Commit time; `None` skips the validity-window check (replay, audit).
    now: Option<Timestamp>,
}

/// Validate a candidate against the index. Returns the chain root.
fn validate(
    index: &Index,
    mandate: &Mandate,
    txn: Option<&Transaction>,
    checks: &Checks<'_>,
) -> Result<VcId, LedgerError> {
    check_unique(index, mandate, txn)?;
    let parents = resolve_parents(index, mandate)?;
    let root = check_linkage(index, mandate, &parents)?;
    check_lifecycle(index, mandate, root)?;
    check_transaction(mandate, txn)?;
    check_drift(mandate, &parents)?;
    check_refund_total(index, mandate, &parents, root)?;
    check_currency(index, mandate, &parents)?;
    check_issuer(mandate, checks.issuers)?;
    check_proof(mandate, checks.verifier)?;
    if let Some(now) = checks.now {
        let window = mandate.window();
        if !window.contains(now) {
            return Err(LedgerError::Expired {
                vc_id: mandate.vc_id(),
                at: now,
                expiration: window.expiration(),
            });
        }
    }
    Ok(root)
}

fn check_unique(index: &Index, mandate: &Mandate, txn: Option<&Transaction>) -> Result<(), LedgerError> {
    if index.by_vc.contains_key(&mandate.vc_id()) {
        return Err(duplicate("vc_id", mandate.vc_id()));
    }
    if index.mandate_ids.contains(&mandate.mandate_id()) {
        return Err(duplicate("mandate_id", mandate.mandate_id()));
    }
    if let Some(txn) = txn {
        if index.txn_ids.contains(&txn.txn_id) {
            return Err(duplicate("txn_id", txn.txn_id));
        }
    }
    Ok(())
}

fn duplicate(kind: &'static str, id: impl fmt::Display) -> LedgerError {
    LedgerError::DuplicateIdentifier {
        kind,
        id: id.to_string(),
    }
}

fn resolve_parents<'a>(index: &'a Index, mandate: &Mandate) -> Result<Vec<&'a LedgerEntry>, LedgerError> {
    mandate
        .prev_refs()
        .iter()
        .map(|r| {
            index.get(r).ok_or(LedgerError::DanglingReference {
                vc_id: mandate.vc_id(),
                missing: *r,
            })
        })
        .collect()
}

fn check_linkage(index: &Index, mandate: &Mandate, parents: &[&LedgerEntry]) -> Result<VcId, LedgerError> {
    let vc_id = mandate.vc_id();
    let bad = |reason: String| LedgerError::InvalidLinkage { vc_id, reason };

    let Some(first) = parents.first() else {
        return match mandate.kind() {
            MandateKind::Intent => Ok(vc_id),
            kind => Err(bad(format!("a {kind} mandate cannot start a chain"))),
        };
    };

    let mut seen = HashSet::new();
    if let Some(dup) = mandate.prev_refs().iter().find(|r| !seen.insert(**r)) {
        return Err(bad(format!("{dup} is referenced twice")));
    }

    let root = index
        .root_of
        .get(&first.mandate.vc_id())
        .copied()
        .ok_or_else(|| bad("parent has no chain".to_string()))?;
    if parents
        .iter()
        .any(|p| index.root_of.get(&p.mandate.vc_id()) != Some(&root))
    {
        return Err(bad("references span more than one chain".to_string()));
    }

    let kinds: Vec<MandateKind> = parents.iter().map(|p| p.mandate.kind()).collect();
    let shape = |expected: &str| bad(format!("expected parents [{expected}], got {kinds:?}"));

    match mandate.subject() {
        MandateSubject::Intent(_) => return Err(bad("an intent cannot reference predecessors".to_string())),
        MandateSubject::Cart(_) => {
            if kinds != [MandateKind::Intent] {
                return Err(shape("intent"));
            }
        }
        MandateSubject::Netting(_) => {
            if kinds != [MandateKind::Cart] {
                return Err(shape("cart"));
            }
        }
        MandateSubject::Payment(p) => {
            let cart = match parents {
                [cart] if cart.mandate.kind() == MandateKind::Cart => cart,
                [cart, netting]
                    if cart.mandate.kind() == MandateKind::Cart
                        && netting.mandate.settled_netting().is_some() =>
                {
                    cart
                }
                _ => return Err(shape("cart] or [cart, settled netting")),
            };
            let digest = cart
                .mandate
                .content_digest()
                .map_err(|e| bad(format!("cannot digest cart: {e}")))?;
            if digest != p.cart_digest {
                return Err(bad(format!(
                    "cart digest {} does not match cart {} ({digest})",
                    p.cart_digest,
                    cart.mandate.vc_id()
                )));
            }
        }
        MandateSubject::Refund(r) => {
            if kinds != [MandateKind::Payment] {
                return Err(shape("payment"));
            }
            if first.mandate.vc_id() != r.original_payment {
                return Err(bad(format!(
                    "refund names payment {} but references {}",
                    r.original_payment,
                    first.mandate.vc_id()
                )));
            }
        }
        MandateSubject::FraudFlag(f) => {
            if parents.len() != 1 || first.mandate.vc_id() != f.flagged {
                return Err(bad(format!(
                    "fraud flag must reference exactly the flagged mandate {}",
                    f.flagged
                )));
            }
        }
    }
    Ok(root)
}

/// At most one Cart, netting request, settlement, Payment and Refund per
/// chain, in lifecycle order.
fn check_lifecycle(index: &Index, mandate: &Mandate, root: VcId) -> Result<(), LedgerError> {
    if mandate.is_root() {
        return Ok(());
    }
    let rejected = |source: ChainError| LedgerError::Lifecycle {
        vc_id: mandate.vc_id(),
        chain: root,
        source,
    };
    let committed = index.chain(&root).map(|e| &e.mandate);
    let mut status = ChainStatus::replay(committed).map_err(rejected)?;
    status.apply(mandate).map_err(rejected)
}

fn check_transaction(mandate: &Mandate, txn: Option<&Transaction>) -> Result<(), LedgerError> {
    let vc_id = mandate.vc_id();
    let bad = |reason: String| LedgerError::InvalidTransaction { vc_id, reason };
    let subject = mandate.subject();

    let expected = match subject {
        MandateSubject::Payment(p) => Some((TransactionKind::Payment, Some(p.amount))),
        MandateSubject::Refund(r) => Some((TransactionKind::Refund, r.amount.checked_neg())),
        MandateSubject::FraudFlag(_) => Some((TransactionKind::FraudNullify, Some(Amount::ZERO))),
        MandateSubject::Netting(n) if n.phase == NettingPhase::Settled => {
            Some((TransactionKind::Netting, Some(n.amount)))
        }
        MandateSubject::Intent(_) | MandateSubject::Cart(_) | MandateSubject::Netting(_) => None,
    };

    let (kind, amount, txn) = match (expected, txn) {
        (None, None) => return Ok(()),
        (None, Some(t)) => {
            return Err(bad(format!(
                "a {} mandate carries no transaction, got {}",
                mandate.kind(),
                t.kind
            )))
        }
        (Some((kind, _)), None) => return Err(bad(format!("missing {kind} transaction"))),
        (Some((kind, amount)), Some(t)) => (kind, amount, t),
    };

    if txn.kind != kind {
        return Err(bad(format!("expected {kind} transaction, got {}", txn.kind)));
    }
    if txn.linked_mandate != vc_id {
        return Err(bad(format!("transaction is linked to {}", txn.linked_mandate)));
    }
    if !txn.kind.admits(txn.amount) {
        return Err(bad(format!("{} transaction cannot carry {}", txn.kind, txn.amount)));
    }
    if Some(txn.amount) != amount {
        return Err(bad(format!(
            "transaction amount {} does not match the mandate",
            txn.amount
        )));
    }
    if &txn.currency != subject.currency() {
        return Err(bad(format!(
            "transaction currency {} differs from mandate currency {}",
            txn.currency,
            subject.currency()
        )));
    }
    if &txn.to != subject.counterparty() {
        return Err(bad(format!("transaction pays {}, mandate names {}", txn.to, subject.counterparty())));
    }
    let payer = match subject {
        MandateSubject::Payment(p) => {
            if txn.txn_id != p.txn_id {
                return Err(bad(format!("transaction id {} differs from {}", txn.txn_id, p.txn_id)));
            }
            Some(&p.payer)
        }
        MandateSubject::Refund(r) => Some(&r.payer),
        MandateSubject::Netting(n) => Some(&n.payer),
        _ => None,
    };
    if let Some(payer) = payer {
        if &txn.from != payer {
            return Err(bad(format!("transaction is from {}, mandate payer is {payer}", txn.from)));
        }
    }
    Ok(())
}

fn check_drift(mandate: &Mandate, parents: &[&LedgerEntry]) -> Result<(), LedgerError> {
    let Some(parent) = parents.first() else {
        return Ok(());
    };
    let subject = mandate.subject();
    let compare_amount = match (subject, parent.mandate.subject()) {
        (MandateSubject::Cart(_), MandateSubject::Intent(_)) => true,
        (MandateSubject::Payment(_), MandateSubject::Cart(_)) => true,
        (MandateSubject::Netting(n), MandateSubject::Cart(_)) => n.phase == NettingPhase::Requested,
        _ => return Ok(()),
    };

    let drift = |reason: String| LedgerError::AmountDrift {
        vc_id: mandate.vc_id(),
        against: parent.mandate.vc_id(),
        reason,
    };
    let theirs = parent.mandate.subject();
    if compare_amount && subject.amount() != theirs.amount() {
        return Err(drift(format!(
            "amount {} differs from {}",
            display_amount(subject.amount()),
            display_amount(theirs.amount())
        )));
    }
    if subject.currency() != theirs.currency() {
        return Err(drift(format!(
            "currency {} differs from {}",
            subject.currency(),
            theirs.currency()
        )));
    }
    if subject.counterparty() != theirs.counterparty() {
        return Err(drift(format!(
            "counterparty {} differs from {}",
            subject.counterparty(),
            theirs.counterparty()
        )));
    }
    Ok(())
}

fn display_amount(amount: Option<Amount>) -> String {
    amount.map_or_else(|| "none".to_string(), |a| a.to_string())
}

fn check_refund_total(
    index: &Index,
    mandate: &Mandate,
    parents: &[&LedgerEntry],
    root: VcId,
) -> Result<(), LedgerError> {
    let MandateSubject::Refund(refund) = mandate.subject() else {
        return Ok(());
    };
    let Some(MandateSubject::Payment(payment)) = parents.first().map(|p| p.mandate.subject()) else {
        return Ok(());
    };
    let refunded = index
        .chain(&root)
        .filter_map(|e| match e.mandate.subject() {
            MandateSubject::Refund(r) if r.original_payment == refund.original_payment => Some(r.amount),
            _ => None,
        })
        .try_fold(Amount::ZERO, Amount::checked_add);
    let total = refunded.and_then(|r| r.checked_add(refund.amount));
    match (refunded, total) {
        (Some(_), Some(total)) if total <= payment.amount => Ok(()),
        _ => Err(LedgerError::RefundExceedsOriginal {
            payment: refund.original_payment,
            original: payment.amount,
            refunded: refunded.unwrap_or(payment.amount),
            requested: refund.amount,
        }),
    }
}

fn check_currency(index: &Index, mandate: &Mandate, parents: &[&LedgerEntry]) -> Result<(), LedgerError> {
    let reference = match mandate.subject() {
        MandateSubject::Refund(_) => parents.first().map(|p| &p.mandate),
        MandateSubject::FraudFlag(f) => nearest_payment(index, &f.flagged),
        _ => None,
    };
    let Some(reference) = reference else {
        return Ok(());
    };
    let expected = reference.subject().currency();
    let actual = mandate.subject().currency();
    if expected != actual {
        return Err(LedgerError::CurrencyMismatch {
            vc_id: mandate.vc_id(),
            expected: expected.clone(),
            actual: actual.clone(),
        });
    }
    Ok(())
}

/// The latest Payment among `vc_id` and its ancestors, else `vc_id` itself.
fn nearest_payment<'a>(index: &'a Index, vc_id: &VcId) -> Option<&'a Mandate> {
    let ancestors = index.ancestors(vc_id);
    let target = index.get(vc_id);
    ancestors
        .into_iter()
        .rev()
        .find(|e| e.mandate.kind() == MandateKind::Payment)
        .or(target)
        .map(|e| &e.mandate)
}

fn check_issuer(mandate: &Mandate, issuers: &IssuerDirectory) -> Result<(), LedgerError> {
    let expected = issuers.for_kind(mandate.kind());
    if mandate.issuer() != expected {
        return Err(LedgerError::ProofRejected {
            vc_id: mandate.vc_id(),
            reason: format!(
                "a {} must be issued by {expected}, not {}",
                mandate.kind(),
                mandate.issuer()
            ),
        });
    }
    Ok(())
}

fn check_proof(mandate: &Mandate, verifier: Option<&dyn Verifier>) -> Result<(), LedgerError> {
    let rejected = |reason: &str| LedgerError::ProofRejected {
        vc_id: mandate.vc_id(),
        reason: reason.to_string(),
    };
    if mandate.proof().is_none() {
        return Err(rejected("mandate is unsigned"));
    }
    if let Some(verifier) = verifier {
        if !verifier.verify(mandate) {
            return Err(rejected("signature does not verify against a trusted issuer key"));
        }
    }
    Ok(())
}

// ─── Ledger ─────────────────────────────────────────────────────────

struct Inner {
    index: Index,
    log: Box<dyn AppendLog>,
}

/// The append-only store of mandates and transactions.
pub struct Ledger {
    inner: RwLock<Inner>,
    issuers: IssuerDirectory,
    clock: Arc<dyn IdentityProvider>,
    verifier: Option<Arc<dyn Verifier>>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("entries", &self.len())
            .field("verifies_proofs", &self.verifier.is_some())
            .finish()
    }
}

impl Ledger {
    /// An empty ledger backed by a [`MemoryLog`]. `issuers` fixes which
    /// identity may issue each mandate kind.
    pub fn in_memory(
        issuers: IssuerDirectory,
        clock: Arc<dyn IdentityProvider>,
        verifier: Option<Arc<dyn Verifier>>,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner {
                index: Index::default(),
                log: Box::new(MemoryLog::new()),
            }),
            issuers,
            clock,
            verifier,
        }
    }

    /// Open a ledger over `log`, replaying every stored entry through the
    /// commit checks. Validity windows are not re-checked: an entry that was
    /// valid when committed stays committed.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the log cannot be read, and
    /// [`LedgerError::Replay`] for the first stored entry that fails.
    pub fn open(
        log: Box<dyn AppendLog>,
        issuers: IssuerDirectory,
        clock: Arc<dyn IdentityProvider>,
        verifier: Option<Arc<dyn Verifier>>,
    ) -> Result<Self, LedgerError> {
        let stored = log.replay()?;
        let mut index = Index::default();
        {
            let checks = Checks {
                issuers: &issuers,
                verifier: verifier.as_deref(),
                now: None,
            };
            for entry in stored {
                let seq = entry.seq;
                let replay_err = |source: LedgerError| LedgerError::Replay {
                    seq,
                    source: Box::new(source),
                };
                if seq != index.next_seq() {
                    return Err(replay_err(LedgerError::Storage(LogError::OutOfOrder {
                        expected: index.next_seq(),
                        found: seq,
                    })));
                }
                let root = validate(&index, &entry.mandate, entry.transaction.as_ref(), &checks)
                    .map_err(replay_err)?;
                index.insert(entry, root);
            }
        }
        tracing::info!(entries = index.entries.len(), chains = index.chains.len(), "ledger opened");
        Ok(Self {
            inner: RwLock::new(Inner { index, log }),
            issuers,
            clock,
            verifier,
        })
    }

    /// Commit a signed mandate and the transaction it carries, atomically.
    ///
    /// Returns the assigned sequence number. On any error nothing is
    /// committed.
    pub fn commit(&self, mandate: Mandate, transaction: Option<Transaction>) -> Result<u64, LedgerError> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let checks = Checks {
            issuers: &self.issuers,
            verifier: self.verifier.as_deref(),
            now: Some(now),
        };
        let root = match validate(&inner.index, &mandate, transaction.as_ref(), &checks) {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(
                    vc_id = %mandate.vc_id(),
                    kind = %mandate.kind(),
                    error = %e,
                    "commit rejected"
                );
                return Err(e);
            }
        };
        let entry = LedgerEntry {
            seq: inner.index.next_seq(),
            committed_at: now,
            mandate,
            transaction,
        };
        inner.log.append(&entry)?;
        let seq = entry.seq;
        tracing::info!(
            seq,
            vc_id = %entry.mandate.vc_id(),
            kind = %entry.mandate.kind(),
            chain = %root,
            "committed mandate"
        );
        inner.index.insert(entry, root);
        Ok(seq)
    }

    /// The committed entry for `vc_id`.
    pub fn lookup(&self, vc_id: &VcId) -> Result<LedgerEntry, LedgerError> {
        self.inner
            .read()
            .index
            .get(vc_id)
            .cloned()
            .ok_or(LedgerError::NotFound { vc_id: *vc_id })
    }

    /// `vc_id` and all its ancestors, root first, each exactly once.
    pub fn chain_of(&self, vc_id: &VcId) -> Result<Vec<Mandate>, LedgerError> {
        let inner = self.inner.read();
        if inner.index.get(vc_id).is_none() {
            return Err(LedgerError::NotFound { vc_id: *vc_id });
        }
        Ok(inner
            .index
            .ancestors(vc_id)
            .into_iter()
            .map(|e| e.mandate.clone())
            .collect())
    }

    /// Root Intent of the chain containing `vc_id`.
    pub fn chain_root(&self, vc_id: &VcId) -> Result<VcId, LedgerError> {
        self.inner
            .read()
            .index
            .root_of
            .get(vc_id)
            .copied()
            .ok_or(LedgerError::NotFound { vc_id: *vc_id })
    }

    /// Every entry of the chain containing `vc_id`, in commit order.
    pub fn chain_entries(&self, vc_id: &VcId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let inner = self.inner.read();
        let root = inner
            .index
            .root_of
            .get(vc_id)
            .ok_or(LedgerError::NotFound { vc_id: *vc_id })?;
        Ok(inner.index.chain(root).cloned().collect())
    }

    /// Transactions of the chain rooted at `root`, oldest first.
    pub fn transactions_of(&self, root: &VcId) -> Result<Vec<Transaction>, LedgerError> {
        let inner = self.inner.read();
        if !inner.index.chains.contains_key(root) {
            return Err(LedgerError::NotFound { vc_id: *root });
        }
        Ok(inner
            .index
            .chain(root)
            .filter_map(|e| e.transaction.clone())
            .collect())
    }

    /// Roots of every chain, oldest first.
    pub fn roots(&self) -> Vec<VcId> {
        let inner = self.inner.read();
        inner
            .index
            .entries
            .iter()
            .filter(|e| e.mandate.is_root())
            .map(|e| e.mandate.vc_id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-check the stored chain containing `vc_id` and total its money.
    ///
    /// Each entry is validated against the entries of the chain committed
    /// before it. Validity windows are not re-checked.
    pub fn audit(&self, vc_id: &VcId) -> Result<AuditReport, LedgerError> {
        let inner = self.inner.read();
        let root = *inner
            .index
            .root_of
            .get(vc_id)
            .ok_or(LedgerError::NotFound { vc_id: *vc_id })?;
        let checks = Checks {
            issuers: &self.issuers,
            verifier: self.verifier.as_deref(),
            now: None,
        };

        let mut scratch = Index::default();
        let mut findings = Vec::new();
        let mut paid = Amount::ZERO;
        let mut refunded = Amount::ZERO;
        let mut fraud_flags = 0;
        for entry in inner.index.chain(&root) {
            if let Err(e) = validate(&scratch, &entry.mandate, entry.transaction.as_ref(), &checks) {
                findings.push(AuditFinding {
                    seq: entry.seq,
                    vc_id: entry.mandate.vc_id(),
                    problem: e.to_string(),
                });
            }
            if let Some(txn) = &entry.transaction {
                let total = match txn.kind {
                    TransactionKind::Payment => Some(&mut paid),
                    TransactionKind::Refund => Some(&mut refunded),
                    TransactionKind::FraudNullify => {
                        fraud_flags += 1;
                        None
                    }
                    TransactionKind::Netting => None,
                };
                if let Some(total) = total {
                    let magnitude = txn.amount.checked_abs().unwrap_or(Amount::ZERO);
                    match total.checked_add(magnitude) {
                        Some(sum) => *total = sum,
                        None => findings.push(AuditFinding {
                            seq: entry.seq,
                            vc_id: entry.mandate.vc_id(),
                            problem: "running total overflows".to_string(),
                        }),
                    }
                }
            }
            scratch.insert(entry.clone(), root);
        }

        let net = paid.checked_sub(refunded).unwrap_or(Amount::ZERO);
        let report = AuditReport {
            root,
            entries: scratch.entries.len(),
            consistent: findings.is_empty(),
            findings,
            paid,
            refunded,
            net,
            fraud_flags,
        };
        tracing::debug!(chain = %root, consistent = report.consistent, "audited chain");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap2_core::{CurrencyCode, PartyId, SequentialIdentityProvider};
    use ap2_mandate::{
        sign_mandate, CartSubject, FraudFlagSubject, IntentSubject, IssuerDirectory, KeyRing,
        MandateFactory, NettingSubject, PaymentSubject, RefundSubject,
    };
    use std::collections::BTreeMap;

    struct Fixture {
        ids: Arc<SequentialIdentityProvider>,
        factory: MandateFactory,
        keys: Arc<KeyRing>,
        ledger: Ledger,
    }

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn ccy(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    impl Fixture {
        fn new() -> Self {
            let ids = Arc::new(SequentialIdentityProvider::new(
                Timestamp::parse("2026-03-01T10:00:00Z").unwrap(),
            ));
            let issuers = IssuerDirectory::default();
            let keys = Arc::new(KeyRing::derived(b"ledger-test", &issuers.all()));
            let factory = MandateFactory::new(ids.clone(), issuers.clone(), 3600);
            let verifier: Arc<dyn Verifier> = keys.clone();
            let ledger = Ledger::in_memory(issuers, ids.clone(), Some(verifier));
            Self {
                ids,
                factory,
                keys,
                ledger,
            }
        }

        fn signed(&self, prev_refs: Vec<VcId>, subject: MandateSubject) -> Mandate {
            let mut m = self.factory.build(prev_refs, subject).unwrap();
            sign_mandate(self.keys.as_ref(), &mut m, self.ids.now()).unwrap();
            m
        }

        fn commit(&self, m: &Mandate) -> Result<u64, LedgerError> {
            let txn = self.factory.transaction_for(m).unwrap();
            self.ledger.commit(m.clone(), txn)
        }

        fn intent(&self, amount: &str) -> Mandate {
            let m = self.signed(
                vec![],
                MandateSubject::Intent(IntentSubject {
                    payer: party("payer-001"),
                    counterparty: party("Footlocker"),
                    amount: amt(amount),
                    currency: ccy("GBP"),
                    note: String::new(),
                    settlement_run: None,
                }),
            );
            self.commit(&m).unwrap();
            m
        }

        fn cart_subject(&self, amount: &str, currency: &str) -> MandateSubject {
            MandateSubject::Cart(CartSubject {
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt(amount),
                currency: ccy(currency),
                description: "Order from Footlocker".to_string(),
            })
        }

        fn cart(&self, intent: &Mandate) -> Mandate {
            let m = self.signed(vec![intent.vc_id()], self.cart_subject("500", "GBP"));
            self.commit(&m).unwrap();
            m
        }

        fn payment_subject(&self, cart: &Mandate, amount: &str) -> MandateSubject {
            MandateSubject::Payment(PaymentSubject {
                txn_id: self.ids.txn_id(),
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt(amount),
                currency: ccy("GBP"),
                cart_digest: cart.content_digest().unwrap(),
                note: String::new(),
            })
        }

        fn payment(&self, cart: &Mandate) -> Mandate {
            let m = self.signed(vec![cart.vc_id()], self.payment_subject(cart, "500"));
            self.commit(&m).unwrap();
            m
        }

        fn refund_subject(&self, payment: &Mandate, amount: &str, currency: &str) -> MandateSubject {
            MandateSubject::Refund(RefundSubject {
                original_payment: payment.vc_id(),
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt(amount),
                currency: ccy(currency),
                reason: "Accidental Transaction".to_string(),
            })
        }

        fn flag_subject(&self, target: &Mandate, currency: &str) -> MandateSubject {
            MandateSubject::FraudFlag(FraudFlagSubject {
                flagged: target.vc_id(),
                counterparty: party("Footlocker"),
                currency: ccy(currency),
                reason: "Unauthorized".to_string(),
                evidence: BTreeMap::new(),
            })
        }

        fn netting(&self, cart: &Mandate, phase: NettingPhase) -> Mandate {
            let m = self.signed(
                vec![cart.vc_id()],
                MandateSubject::Netting(NettingSubject {
                    phase,
                    payer: party("payer-001"),
                    counterparty: party("Footlocker"),
                    amount: amt("500"),
                    currency: ccy("GBP"),
                    settlement_run: "DTP2".to_string(),
                }),
            );
            self.commit(&m).unwrap();
            m
        }

        /// Re-decode a signed mandate with one envelope field replaced and
        /// sign it again.
        fn reissued(&self, m: &Mandate, field: &str, value: String) -> Mandate {
            let mut json = serde_json::to_value(m).unwrap();
            let obj = json.as_object_mut().unwrap();
            obj.remove("proof");
            obj.insert(field.to_string(), serde_json::Value::String(value));
            let mut copy: Mandate = serde_json::from_value(json).unwrap();
            sign_mandate(self.keys.as_ref(), &mut copy, self.ids.now()).unwrap();
            copy
        }

        fn paid_chain(&self) -> (Mandate, Mandate, Mandate) {
            let intent = self.intent("500");
            let cart = self.cart(&intent);
            let payment = self.payment(&cart);
            (intent, cart, payment)
        }
    }

    #[test]
    fn commits_get_increasing_sequence_numbers() {
        let fx = Fixture::new();
        let (intent, cart, payment) = fx.paid_chain();
        assert_eq!(fx.ledger.len(), 3);
        assert_eq!(fx.ledger.lookup(&intent.vc_id()).unwrap().seq, 1);
        assert_eq!(fx.ledger.lookup(&cart.vc_id()).unwrap().seq, 2);
        let entry = fx.ledger.lookup(&payment.vc_id()).unwrap();
        assert_eq!(entry.seq, 3);
        assert_eq!(entry.transaction.unwrap().amount, amt("500"));
    }

    #[test]
    fn duplicate_vc_id_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let err = fx.ledger.commit(intent, None).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdentifier { kind: "vc_id", .. }));
    }

    #[test]
    fn dangling_reference_rejected() {
        let fx = Fixture::new();
        let ghost = VcId::new();
        let m = fx.signed(vec![ghost], fx.cart_subject("500", "GBP"));
        let err = fx.commit(&m).unwrap_err();
        assert!(matches!(err, LedgerError::DanglingReference { missing, .. } if missing == ghost));
        assert!(fx.ledger.is_empty());
    }

    #[test]
    fn non_intent_root_rejected() {
        let fx = Fixture::new();
        let m = fx.signed(vec![], fx.cart_subject("500", "GBP"));
        assert!(matches!(fx.commit(&m), Err(LedgerError::InvalidLinkage { .. })));
    }

    #[test]
    fn cart_must_follow_intent() {
        let fx = Fixture::new();
        let (_, cart, _) = fx.paid_chain();
        let m = fx.signed(vec![cart.vc_id()], fx.cart_subject("500", "GBP"));
        assert!(matches!(fx.commit(&m), Err(LedgerError::InvalidLinkage { .. })));
    }

    #[test]
    fn references_cannot_span_chains() {
        let fx = Fixture::new();
        let (_, cart_a, _) = fx.paid_chain();
        let intent_b = fx.intent("500");
        let cart_b = fx.cart(&intent_b);
        fx.netting(&cart_b, NettingPhase::Requested);
        let settled = fx.netting(&cart_b, NettingPhase::Settled);
        let m = fx.signed(
            vec![cart_a.vc_id(), settled.vc_id()],
            fx.payment_subject(&cart_a, "500"),
        );
        assert!(matches!(fx.commit(&m), Err(LedgerError::InvalidLinkage { .. })));
    }

    #[test]
    fn payment_cart_digest_must_match() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        let other_intent = fx.intent("500");
        let other_cart = fx.cart(&other_intent);
        let m = fx.signed(vec![cart.vc_id()], fx.payment_subject(&other_cart, "500"));
        assert!(matches!(fx.commit(&m), Err(LedgerError::InvalidLinkage { .. })));
    }

    #[test]
    fn cart_amount_drift_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let m = fx.signed(vec![intent.vc_id()], fx.cart_subject("450", "GBP"));
        assert!(matches!(fx.commit(&m), Err(LedgerError::AmountDrift { .. })));
    }

    #[test]
    fn payment_amount_drift_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        let m = fx.signed(vec![cart.vc_id()], fx.payment_subject(&cart, "5000"));
        assert!(matches!(fx.commit(&m), Err(LedgerError::AmountDrift { .. })));
    }

    #[test]
    fn payment_without_transaction_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        let m = fx.signed(vec![cart.vc_id()], fx.payment_subject(&cart, "500"));
        let err = fx.ledger.commit(m, None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransaction { .. }));
    }

    #[test]
    fn transaction_with_wrong_amount_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        let m = fx.signed(vec![cart.vc_id()], fx.payment_subject(&cart, "500"));
        let mut txn = fx.factory.transaction_for(&m).unwrap().unwrap();
        txn.amount = amt("499");
        assert!(matches!(
            fx.ledger.commit(m, Some(txn)),
            Err(LedgerError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn refunds_cannot_exceed_payment() {
        let fx = Fixture::new();
        let (_, _, payment) = fx.paid_chain();
        let too_much = fx.signed(vec![payment.vc_id()], fx.refund_subject(&payment, "500.0001", "GBP"));
        let err = fx.commit(&too_much).unwrap_err();
        assert!(matches!(err, LedgerError::RefundExceedsOriginal { .. }));

        let whole = fx.signed(vec![payment.vc_id()], fx.refund_subject(&payment, "500", "GBP"));
        fx.commit(&whole).unwrap();
    }

    #[test]
    fn second_refund_rejected() {
        let fx = Fixture::new();
        let (intent, _, payment) = fx.paid_chain();
        let partial = fx.signed(vec![payment.vc_id()], fx.refund_subject(&payment, "200", "GBP"));
        fx.commit(&partial).unwrap();
        let again = fx.signed(vec![payment.vc_id()], fx.refund_subject(&payment, "100", "GBP"));
        match fx.commit(&again).unwrap_err() {
            LedgerError::Lifecycle { vc_id, chain, source } => {
                assert_eq!(vc_id, again.vc_id());
                assert_eq!(chain, intent.vc_id());
                assert!(matches!(source, ChainError::InvalidTransition { .. }));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(fx.ledger.audit(&intent.vc_id()).unwrap().refunded, amt("200"));
    }

    #[test]
    fn second_payment_rejected() {
        let fx = Fixture::new();
        let (intent, cart, _) = fx.paid_chain();
        let again = fx.signed(vec![cart.vc_id()], fx.payment_subject(&cart, "500"));
        let err = fx.commit(&again).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Lifecycle { source: ChainError::InvalidTransition { .. }, .. }
        ));
        assert_eq!(fx.ledger.len(), 3);
        let report = fx.ledger.audit(&intent.vc_id()).unwrap();
        assert!(report.consistent, "{:?}", report.findings);
        assert_eq!(report.paid, amt("500"));
    }

    #[test]
    fn second_cart_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        fx.cart(&intent);
        let again = fx.signed(vec![intent.vc_id()], fx.cart_subject("500", "GBP"));
        assert!(matches!(fx.commit(&again), Err(LedgerError::Lifecycle { .. })));
    }

    #[test]
    fn settlement_without_request_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        let settled = fx.signed(
            vec![cart.vc_id()],
            MandateSubject::Netting(NettingSubject {
                phase: NettingPhase::Settled,
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt("500"),
                currency: ccy("GBP"),
                settlement_run: "DTP2".to_string(),
            }),
        );
        assert!(matches!(fx.commit(&settled), Err(LedgerError::Lifecycle { .. })));
    }

    #[test]
    fn payment_while_netting_pending_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        fx.netting(&cart, NettingPhase::Requested);
        let m = fx.signed(vec![cart.vc_id()], fx.payment_subject(&cart, "500"));
        assert!(matches!(
            fx.commit(&m),
            Err(LedgerError::Lifecycle { source: ChainError::NettingPending { .. }, .. })
        ));
    }

    #[test]
    fn duplicate_mandate_id_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let copy = fx.reissued(&intent, "vc_id", VcId::new().to_string());
        assert_ne!(copy.vc_id(), intent.vc_id());
        assert_eq!(copy.mandate_id(), intent.mandate_id());
        let err = fx.ledger.commit(copy, None).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdentifier { kind: "mandate_id", .. }));
        assert_eq!(fx.ledger.len(), 1);
    }

    #[test]
    fn duplicate_txn_id_rejected() {
        let fx = Fixture::new();
        let (_, _, payment_a) = fx.paid_chain();
        let txn_a = fx.factory.transaction_for(&payment_a).unwrap().unwrap();
        let intent_b = fx.intent("500");
        let cart_b = fx.cart(&intent_b);
        let subject = match fx.payment_subject(&cart_b, "500") {
            MandateSubject::Payment(mut s) => {
                s.txn_id = txn_a.txn_id;
                MandateSubject::Payment(s)
            }
            other => other,
        };
        let payment_b = fx.signed(vec![cart_b.vc_id()], subject);
        let err = fx.commit(&payment_b).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdentifier { kind: "txn_id", .. }));
    }

    #[test]
    fn issuer_must_match_kind() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.signed(vec![intent.vc_id()], fx.cart_subject("500", "GBP"));
        let forged = fx.reissued(&cart, "issuer", "issuer:processor".to_string());
        match fx.ledger.commit(forged, None).unwrap_err() {
            LedgerError::ProofRejected { reason, .. } => {
                assert!(reason.contains("must be issued by issuer:merchant"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
        fx.commit(&cart).unwrap();
    }

    #[test]
    fn refund_currency_must_match() {
        let fx = Fixture::new();
        let (_, _, payment) = fx.paid_chain();
        let m = fx.signed(vec![payment.vc_id()], fx.refund_subject(&payment, "500", "EUR"));
        let err = fx.commit(&m).unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
    }

    #[test]
    fn refund_must_reference_payment() {
        let fx = Fixture::new();
        let (_, cart, _) = fx.paid_chain();
        let wrong = fx.signed(vec![cart.vc_id()], fx.refund_subject(&cart, "500", "GBP"));
        assert!(matches!(fx.commit(&wrong), Err(LedgerError::InvalidLinkage { .. })));
    }

    #[test]
    fn fraud_flag_records_zero_transaction() {
        let fx = Fixture::new();
        let (intent, _, payment) = fx.paid_chain();
        let flag = fx.signed(vec![payment.vc_id()], fx.flag_subject(&payment, "GBP"));
        fx.commit(&flag).unwrap();
        let txns = fx.ledger.transactions_of(&intent.vc_id()).unwrap();
        let last = txns.last().unwrap();
        assert_eq!(last.kind, TransactionKind::FraudNullify);
        assert!(last.amount.is_zero());
        assert_eq!(last.linked_mandate, flag.vc_id());
    }

    #[test]
    fn fraud_flag_currency_follows_nearest_payment() {
        let fx = Fixture::new();
        let (_, _, payment) = fx.paid_chain();
        let flag = fx.signed(vec![payment.vc_id()], fx.flag_subject(&payment, "USD"));
        assert!(matches!(fx.commit(&flag), Err(LedgerError::CurrencyMismatch { .. })));
    }

    #[test]
    fn unsigned_mandate_rejected() {
        let fx = Fixture::new();
        let m = fx
            .factory
            .build(
                vec![],
                MandateSubject::Intent(IntentSubject {
                    payer: party("payer-001"),
                    counterparty: party("Footlocker"),
                    amount: amt("1"),
                    currency: ccy("GBP"),
                    note: String::new(),
                    settlement_run: None,
                }),
            )
            .unwrap();
        assert!(matches!(
            fx.ledger.commit(m, None),
            Err(LedgerError::ProofRejected { .. })
        ));
    }

    #[test]
    fn foreign_signature_rejected() {
        let fx = Fixture::new();
        let stranger = KeyRing::derived(b"someone-else", &IssuerDirectory::default().all());
        let mut m = fx
            .factory
            .build(
                vec![],
                MandateSubject::Intent(IntentSubject {
                    payer: party("payer-001"),
                    counterparty: party("Footlocker"),
                    amount: amt("1"),
                    currency: ccy("GBP"),
                    note: String::new(),
                    settlement_run: None,
                }),
            )
            .unwrap();
        sign_mandate(&stranger, &mut m, fx.ids.now()).unwrap();
        assert!(matches!(
            fx.ledger.commit(m, None),
            Err(LedgerError::ProofRejected { .. })
        ));
    }

    #[test]
    fn expired_mandate_rejected() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.signed(vec![intent.vc_id()], fx.cart_subject("500", "GBP"));
        fx.ids.advance(3600);
        assert!(matches!(fx.commit(&cart), Err(LedgerError::Expired { .. })));
    }

    #[test]
    fn chain_of_is_ordered_and_duplicate_free() {
        let fx = Fixture::new();
        let intent = fx.intent("500");
        let cart = fx.cart(&intent);
        let request = fx.signed(
            vec![cart.vc_id()],
            MandateSubject::Netting(NettingSubject {
                phase: NettingPhase::Requested,
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt("500"),
                currency: ccy("GBP"),
                settlement_run: "DTP2".to_string(),
            }),
        );
        fx.commit(&request).unwrap();
        let settled = fx.signed(
            vec![cart.vc_id()],
            MandateSubject::Netting(NettingSubject {
                phase: NettingPhase::Settled,
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt("480"),
                currency: ccy("GBP"),
                settlement_run: "DTP2".to_string(),
            }),
        );
        fx.commit(&settled).unwrap();
        let payment = fx.signed(
            vec![cart.vc_id(), settled.vc_id()],
            fx.payment_subject(&cart, "500"),
        );
        fx.commit(&payment).unwrap();

        let chain: Vec<VcId> = fx
            .ledger
            .chain_of(&payment.vc_id())
            .unwrap()
            .iter()
            .map(Mandate::vc_id)
            .collect();
        assert_eq!(chain, vec![intent.vc_id(), cart.vc_id(), settled.vc_id(), payment.vc_id()]);
        assert_eq!(fx.ledger.chain_root(&payment.vc_id()).unwrap(), intent.vc_id());
        assert_eq!(fx.ledger.chain_entries(&cart.vc_id()).unwrap().len(), 5);
    }

    #[test]
    fn missing_lookups_are_not_found() {
        let fx = Fixture::new();
        let ghost = VcId::new();
        assert!(matches!(fx.ledger.lookup(&ghost), Err(LedgerError::NotFound { .. })));
        assert!(matches!(fx.ledger.chain_of(&ghost), Err(LedgerError::NotFound { .. })));
        assert!(matches!(fx.ledger.transactions_of(&ghost), Err(LedgerError::NotFound { .. })));
        assert!(matches!(fx.ledger.audit(&ghost), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn audit_totals_a_refunded_chain() {
        let fx = Fixture::new();
        let (intent, _, payment) = fx.paid_chain();
        let refund = fx.signed(vec![payment.vc_id()], fx.refund_subject(&payment, "120.5", "GBP"));
        fx.commit(&refund).unwrap();
        let report = fx.ledger.audit(&intent.vc_id()).unwrap();
        assert!(report.consistent, "{:?}", report.findings);
        assert_eq!(report.entries, 4);
        assert_eq!(report.paid, amt("500"));
        assert_eq!(report.refunded, amt("120.5"));
        assert_eq!(report.net, amt("379.5"));
        assert_eq!(fx.ledger.roots(), vec![intent.vc_id()]);
    }

    #[test]
    fn reopen_replays_through_checks() {
        let fx = Fixture::new();
        let (intent, _, payment) = fx.paid_chain();
        let entries: Vec<LedgerEntry> = fx
            .ledger
            .chain_entries(&intent.vc_id())
            .unwrap();

        // Clock far past every window: replay does not re-check expiry.
        fx.ids.advance(86_400);
        let verifier: Arc<dyn Verifier> = fx.keys.clone();
        let reopened = Ledger::open(
            Box::new(MemoryLog::from_entries(entries.clone())),
            IssuerDirectory::default(),
            fx.ids.clone(),
            Some(verifier.clone()),
        )
        .unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.lookup(&payment.vc_id()).unwrap(), entries[2]);

        let mut tampered = entries;
        if let Some(txn) = tampered[2].transaction.as_mut() {
            txn.amount = amt("1");
        }
        let err = Ledger::open(
            Box::new(MemoryLog::from_entries(tampered)),
            IssuerDirectory::default(),
            fx.ids.clone(),
            Some(verifier),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Replay { seq: 3, .. }));
    }

    #[test]
    fn reopen_rejects_a_second_payment_in_the_log() {
        let fx = Fixture::new();
        let (intent, cart, _) = fx.paid_chain();
        let mut entries = fx.ledger.chain_entries(&intent.vc_id()).unwrap();
        let again = fx.signed(vec![cart.vc_id()], fx.payment_subject(&cart, "500"));
        entries.push(LedgerEntry {
            seq: 4,
            committed_at: fx.ids.now(),
            transaction: fx.factory.transaction_for(&again).unwrap(),
            mandate: again,
        });
        let verifier: Arc<dyn Verifier> = fx.keys.clone();
        let err = Ledger::open(
            Box::new(MemoryLog::from_entries(entries)),
            IssuerDirectory::default(),
            fx.ids.clone(),
            Some(verifier),
        )
        .unwrap_err();
        match err {
            LedgerError::Replay { seq, source } => {
                assert_eq!(seq, 4);
                assert!(matches!(*source, LedgerError::Lifecycle { .. }));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
