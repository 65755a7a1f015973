//! # Mandate Factory
//!
//! Pure construction. Given a subject and the predecessor set chosen by the
//! chain engine, the factory validates the subject, allocates fresh
//! identities from the injected [`IdentityProvider`], stamps the issuer fixed
//! for the kind and a validity window, and returns an unsigned [`Mandate`].
//!
//! The factory does not know whether the mandate is currently allowed in its
//! chain. That is the engine's decision, and the ledger's invariants back it.

use std::sync::Arc;

use ap2_core::{Amount, IdentityProvider, IssuerId, PartyId, ValidationError, VcId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mandate::{Mandate, MandateKind, MandateSubject, NettingPhase};
use crate::transaction::{Transaction, TransactionKind};

/// Errors from mandate construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// The subject is incomplete or inconsistent for its kind.
    #[error("invalid {kind} subject: {reason}")]
    InvalidSubject {
        /// Kind being built.
        kind: MandateKind,
        /// What is wrong.
        reason: String,
    },

    /// The validity window could not be formed.
    #[error("invalid validity window: {0}")]
    Window(#[from] ValidationError),
}

/// Issuer identity per role. Each mandate kind has one fixed issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IssuerDirectory {
    /// Issues Intents.
    pub user_wallet: IssuerId,
    /// Issues Carts.
    pub merchant: IssuerId,
    /// Issues Netting mandates.
    pub netting: IssuerId,
    /// Issues Payments, Refunds and FraudFlags.
    pub processor: IssuerId,
}

impl Default for IssuerDirectory {
    fn default() -> Self {
        Self {
            user_wallet: IssuerId::from_static("issuer:user-wallet"),
            merchant: IssuerId::from_static("issuer:merchant"),
            netting: IssuerId::from_static("issuer:netting"),
            processor: IssuerId::from_static("issuer:processor"),
        }
    }
}

impl IssuerDirectory {
    /// The issuer fixed for `kind`.
    pub fn for_kind(&self, kind: MandateKind) -> &IssuerId {
        match kind {
            MandateKind::Intent => &self.user_wallet,
            MandateKind::Cart => &self.merchant,
            MandateKind::Netting => &self.netting,
            MandateKind::Payment | MandateKind::Refund | MandateKind::FraudFlag => &self.processor,
        }
    }

    /// Every configured issuer, without duplicates.
    pub fn all(&self) -> Vec<IssuerId> {
        let mut all = vec![
            self.user_wallet.clone(),
            self.merchant.clone(),
            self.netting.clone(),
            self.processor.clone(),
        ];
        all.sort();
        all.dedup();
        all
    }
}

/// Builds unsigned mandates and their transactions.
pub struct MandateFactory {
    ids: Arc<dyn IdentityProvider>,
    issuers: IssuerDirectory,
    ttl_secs: u64,
}

impl std::fmt::Debug for MandateFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MandateFactory")
            .field("issuers", &self.issuers)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl MandateFactory {
    pub fn new(ids: Arc<dyn IdentityProvider>, issuers: IssuerDirectory, ttl_secs: u64) -> Self {
        Self { ids, issuers, ttl_secs }
    }

    pub fn issuers(&self) -> &IssuerDirectory {
        &self.issuers
    }

    /// Build an unsigned mandate.
    ///
    /// # Errors
    ///
    /// [`FactoryError::InvalidSubject`] when the subject is incomplete,
    /// carries a disallowed amount, or disagrees with `prev_refs`.
    pub fn build(
        &self,
        prev_refs: Vec<VcId>,
        subject: MandateSubject,
    ) -> Result<Mandate, FactoryError> {
        validate_subject(&subject, &prev_refs)?;
        let kind = subject.kind();
        let window = self.ids.window(self.ttl_secs)?;
        let mandate = Mandate::new(
            self.ids.mandate_id(),
            self.ids.vc_id(),
            self.issuers.for_kind(kind).clone(),
            window,
            prev_refs,
            subject,
        );
        tracing::debug!(
            kind = %kind,
            vc_id = %mandate.vc_id(),
            prev_refs = mandate.prev_refs().len(),
            "built mandate"
        );
        Ok(mandate)
    }

    /// The transaction a mandate carries, if it has monetary effect.
    ///
    /// Payments reuse the `txn_id` recorded in their subject; other kinds
    /// get a fresh one. FraudFlag transactions run from the processor to the
    /// counterparty with a zero amount.
    pub fn transaction_for(&self, mandate: &Mandate) -> Result<Option<Transaction>, FactoryError> {
        let timestamp = self.ids.now();
        let linked_mandate = mandate.vc_id();
        let txn = match mandate.subject() {
            MandateSubject::Payment(p) => Some(Transaction {
                txn_id: p.txn_id,
                from: p.payer.clone(),
                to: p.counterparty.clone(),
                amount: p.amount,
                currency: p.currency.clone(),
                kind: TransactionKind::Payment,
                linked_mandate,
                timestamp,
            }),
            MandateSubject::Refund(r) => {
                let amount = r.amount.checked_neg().ok_or_else(|| FactoryError::InvalidSubject {
                    kind: MandateKind::Refund,
                    reason: "refund amount out of range".to_string(),
                })?;
                Some(Transaction {
                    txn_id: self.ids.txn_id(),
                    from: r.payer.clone(),
                    to: r.counterparty.clone(),
                    amount,
                    currency: r.currency.clone(),
                    kind: TransactionKind::Refund,
                    linked_mandate,
                    timestamp,
                })
            }
            MandateSubject::FraudFlag(f) => {
                let from = PartyId::new(self.issuers.processor.as_str()).map_err(|e| {
                    FactoryError::InvalidSubject {
                        kind: MandateKind::FraudFlag,
                        reason: e.to_string(),
                    }
                })?;
                Some(Transaction {
                    txn_id: self.ids.txn_id(),
                    from,
                    to: f.counterparty.clone(),
                    amount: Amount::ZERO,
                    currency: f.currency.clone(),
                    kind: TransactionKind::FraudNullify,
                    linked_mandate,
                    timestamp,
                })
            }
            MandateSubject::Netting(n) if n.phase == NettingPhase::Settled => Some(Transaction {
                txn_id: self.ids.txn_id(),
                from: n.payer.clone(),
                to: n.counterparty.clone(),
                amount: n.amount,
                currency: n.currency.clone(),
                kind: TransactionKind::Netting,
                linked_mandate,
                timestamp,
            }),
            MandateSubject::Intent(_) | MandateSubject::Cart(_) | MandateSubject::Netting(_) => None,
        };
        Ok(txn)
    }
}

fn invalid(kind: MandateKind, reason: impl Into<String>) -> FactoryError {
    FactoryError::InvalidSubject {
        kind,
        reason: reason.into(),
    }
}

fn positive(kind: MandateKind, amount: Amount) -> Result<(), FactoryError> {
    if !amount.is_positive() {
        return Err(invalid(kind, format!("amount must be positive, got {amount}")));
    }
    Ok(())
}

fn non_blank(kind: MandateKind, field: &str, value: &str) -> Result<(), FactoryError> {
    if value.trim().is_empty() {
        return Err(invalid(kind, format!("{field} is required")));
    }
    Ok(())
}

fn validate_subject(subject: &MandateSubject, prev_refs: &[VcId]) -> Result<(), FactoryError> {
    let kind = subject.kind();
    match subject {
        // Amounts on the way to a Payment already obey the Payment's rule.
        MandateSubject::Intent(s) => {
            positive(kind, s.amount)?;
            if let Some(run) = &s.settlement_run {
                non_blank(kind, "settlement_run", run)?;
            }
        }
        MandateSubject::Cart(s) => positive(kind, s.amount)?,
        MandateSubject::Netting(s) => {
            non_blank(kind, "settlement_run", &s.settlement_run)?;
            if s.phase == NettingPhase::Requested {
                positive(kind, s.amount)?;
            }
        }
        MandateSubject::Payment(s) => positive(kind, s.amount)?,
        MandateSubject::Refund(s) => {
            positive(kind, s.amount)?;
            non_blank(kind, "reason", &s.reason)?;
            if prev_refs.first() != Some(&s.original_payment) {
                return Err(invalid(
                    kind,
                    format!("original payment {} must be the first predecessor", s.original_payment),
                ));
            }
        }
        MandateSubject::FraudFlag(s) => {
            non_blank(kind, "reason", &s.reason)?;
            if !prev_refs.contains(&s.flagged) {
                return Err(invalid(
                    kind,
                    format!("flagged mandate {} must be a predecessor", s.flagged),
                ));
            }
            if s.evidence.keys().any(|k| k.trim().is_empty()) {
                return Err(invalid(kind, "evidence keys must not be blank"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mandate::{FraudFlagSubject, IntentSubject, NettingSubject, PaymentSubject, RefundSubject};
    use ap2_core::{sha256_digest, CanonicalBytes, CurrencyCode, SequentialIdentityProvider, Timestamp, TxnId};
    use std::collections::BTreeMap;

    fn factory() -> MandateFactory {
        let ids = SequentialIdentityProvider::new(Timestamp::parse("2026-03-01T10:00:00Z").unwrap());
        MandateFactory::new(Arc::new(ids), IssuerDirectory::default(), 3600)
    }

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn gbp() -> CurrencyCode {
        CurrencyCode::new("GBP").unwrap()
    }

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn intent_subject(amount: &str) -> MandateSubject {
        MandateSubject::Intent(IntentSubject {
            payer: party("payer-001"),
            counterparty: party("Footlocker"),
            amount: amt(amount),
            currency: gbp(),
            note: String::new(),
            settlement_run: None,
        })
    }

    fn payment_subject(amount: &str) -> MandateSubject {
        MandateSubject::Payment(PaymentSubject {
            txn_id: TxnId::new(),
            payer: party("payer-001"),
            counterparty: party("Footlocker"),
            amount: amt(amount),
            currency: gbp(),
            cart_digest: sha256_digest(&CanonicalBytes::new(&"cart").unwrap()),
            note: String::new(),
        })
    }

    #[test]
    fn intent_gets_fixed_issuer_and_window() {
        let f = factory();
        let m = f.build(vec![], intent_subject("500")).unwrap();
        assert_eq!(m.issuer().as_str(), "issuer:user-wallet");
        assert_eq!(m.window().issuance().to_iso8601(), "2026-03-01T10:00:00Z");
        assert_eq!(m.window().expiration().to_iso8601(), "2026-03-01T11:00:00Z");
        assert!(m.proof().is_none());
        assert_ne!(m.mandate_id().as_uuid(), m.vc_id().as_uuid());
    }

    #[test]
    fn issuer_per_kind() {
        let d = IssuerDirectory::default();
        assert_eq!(d.for_kind(MandateKind::Cart).as_str(), "issuer:merchant");
        assert_eq!(d.for_kind(MandateKind::Netting).as_str(), "issuer:netting");
        assert_eq!(d.for_kind(MandateKind::Refund).as_str(), "issuer:processor");
        assert_eq!(d.all().len(), 4);
    }

    #[test]
    fn negative_intent_rejected() {
        let err = factory().build(vec![], intent_subject("-1")).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidSubject { kind: MandateKind::Intent, .. }));
    }

    #[test]
    fn zero_intent_rejected() {
        let err = factory().build(vec![], intent_subject("0")).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidSubject { kind: MandateKind::Intent, .. }));
    }

    #[test]
    fn intent_with_blank_settlement_run_rejected() {
        let subject = MandateSubject::Intent(IntentSubject {
            payer: party("payer-001"),
            counterparty: party("CNY"),
            amount: amt("500000"),
            currency: CurrencyCode::new("KRW").unwrap(),
            note: String::new(),
            settlement_run: Some(" ".to_string()),
        });
        let err = factory().build(vec![], subject).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidSubject { kind: MandateKind::Intent, .. }));
    }

    #[test]
    fn zero_payment_rejected() {
        let err = factory().build(vec![VcId::new()], payment_subject("0")).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidSubject { kind: MandateKind::Payment, .. }));
    }

    #[test]
    fn netting_requires_settlement_run() {
        let subject = MandateSubject::Netting(NettingSubject {
            phase: NettingPhase::Requested,
            payer: party("payer-001"),
            counterparty: party("CNY"),
            amount: amt("500000"),
            currency: CurrencyCode::new("KRW").unwrap(),
            settlement_run: "  ".to_string(),
        });
        assert!(factory().build(vec![VcId::new()], subject).is_err());
    }

    #[test]
    fn settled_netting_may_be_negative() {
        let subject = MandateSubject::Netting(NettingSubject {
            phase: NettingPhase::Settled,
            payer: party("payer-001"),
            counterparty: party("CNY"),
            amount: amt("-20"),
            currency: CurrencyCode::new("KRW").unwrap(),
            settlement_run: "DTP2".to_string(),
        });
        let f = factory();
        let m = f.build(vec![VcId::new()], subject).unwrap();
        let txn = f.transaction_for(&m).unwrap().unwrap();
        assert_eq!(txn.kind, TransactionKind::Netting);
        assert_eq!(txn.amount, amt("-20"));
    }

    #[test]
    fn refund_must_reference_its_payment() {
        let payment = VcId::new();
        let subject = |original| {
            MandateSubject::Refund(RefundSubject {
                original_payment: original,
                payer: party("payer-001"),
                counterparty: party("Footlocker"),
                amount: amt("500"),
                currency: gbp(),
                reason: "Accidental Transaction".to_string(),
            })
        };
        let f = factory();
        assert!(f.build(vec![payment], subject(VcId::new())).is_err());
        let m = f.build(vec![payment], subject(payment)).unwrap();
        let txn = f.transaction_for(&m).unwrap().unwrap();
        assert_eq!(txn.kind, TransactionKind::Refund);
        assert_eq!(txn.amount, amt("-500"));
        assert_eq!(txn.linked_mandate, m.vc_id());
    }

    #[test]
    fn fraud_flag_needs_reason_and_yields_zero_transaction() {
        let target = VcId::new();
        let subject = |reason: &str| {
            MandateSubject::FraudFlag(FraudFlagSubject {
                flagged: target,
                counterparty: party("Footlocker"),
                currency: gbp(),
                reason: reason.to_string(),
                evidence: BTreeMap::from([("ip".to_string(), "203.0.113.9".to_string())]),
            })
        };
        let f = factory();
        assert!(f.build(vec![target], subject("")).is_err());
        let m = f.build(vec![target], subject("Unauthorized")).unwrap();
        let txn = f.transaction_for(&m).unwrap().unwrap();
        assert_eq!(txn.kind, TransactionKind::FraudNullify);
        assert!(txn.amount.is_zero());
        assert_eq!(txn.from.as_str(), "issuer:processor");
        assert_eq!(txn.to.as_str(), "Footlocker");
    }

    #[test]
    fn payment_transaction_reuses_subject_txn_id() {
        let f = factory();
        let m = f.build(vec![VcId::new()], payment_subject("500")).unwrap();
        let txn = f.transaction_for(&m).unwrap().unwrap();
        match m.subject() {
            MandateSubject::Payment(p) => assert_eq!(txn.txn_id, p.txn_id),
            other => panic!("unexpected subject {other:?}"),
        }
        assert_eq!(txn.amount, amt("500"));
    }

    #[test]
    fn intent_has_no_transaction() {
        let f = factory();
        let m = f.build(vec![], intent_subject("500")).unwrap();
        assert!(f.transaction_for(&m).unwrap().is_none());
    }
}
