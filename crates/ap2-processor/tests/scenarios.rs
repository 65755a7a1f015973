//! End-to-end payment chains through the processor and ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use ap2_core::{Amount, CurrencyCode, PartyId, SequentialIdentityProvider, Timestamp, VcId};
use ap2_ledger::Ledger;
use ap2_mandate::{ChainExport, KeyRing, MandateKind, TransactionKind, Verifier};
use ap2_processor::{
    ErrorKind, FraudRequest, PayRequest, PaymentProcessor, ProcessorConfig, RefundRequest,
};
use ap2_state::ChainState;
use ap2_vc::MandateSchema;

struct Harness {
    keys: Arc<KeyRing>,
    processor: PaymentProcessor,
}

fn harness() -> Harness {
    let ids = Arc::new(SequentialIdentityProvider::new(
        Timestamp::parse("2026-03-01T10:00:00Z").unwrap(),
    ));
    let config = ProcessorConfig::default();
    let keys = Arc::new(KeyRing::derived(b"scenario-secret", &config.issuers.all()));
    let verifier: Arc<dyn Verifier> = keys.clone();
    let ledger = Arc::new(Ledger::in_memory(config.issuers.clone(), ids.clone(), Some(verifier)));
    let processor = PaymentProcessor::new(config, ledger, keys.clone(), ids);
    Harness { keys, processor }
}

fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

fn ccy(s: &str) -> CurrencyCode {
    CurrencyCode::new(s).unwrap()
}

fn pay(amount: &str, currency: &str, counterparty: &str) -> PayRequest {
    PayRequest::new(PartyId::new(counterparty).unwrap(), amt(amount), ccy(currency))
}

fn refund(payment: VcId, amount: &str, currency: &str) -> RefundRequest {
    RefundRequest {
        payment,
        amount: amt(amount),
        currency: ccy(currency),
        reason: "Accidental Transaction".to_string(),
    }
}

fn payment_of(h: &Harness, request: &PayRequest) -> (VcId, VcId) {
    let summary = h.processor.pay(request).unwrap();
    (summary.root, summary.last_of(MandateKind::Payment).unwrap().vc_id)
}

#[test]
fn scenario_1_direct_payment() {
    let h = harness();
    let summary = h.processor.pay(&pay("500", "GBP", "Footlocker")).unwrap();
    assert_eq!(summary.state, ChainState::Payment);
    assert_eq!(
        summary.kinds(),
        vec![MandateKind::Intent, MandateKind::Cart, MandateKind::Payment]
    );
    assert_eq!(summary.steps[1].prev_refs, vec![summary.steps[0].vc_id]);
    assert_eq!(summary.steps[2].prev_refs, vec![summary.steps[1].vc_id]);

    let txns = h.processor.ledger().transactions_of(&summary.root).unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].kind, TransactionKind::Payment);
    assert_eq!(txns[0].amount, amt("500"));
    assert_eq!(txns[0].currency, ccy("GBP"));
    assert_eq!(txns[0].to.as_str(), "Footlocker");
    assert_eq!(txns[0].linked_mandate, summary.steps[2].vc_id);

    let issuers: Vec<&str> = summary.steps.iter().map(|s| s.issuer.as_str()).collect();
    assert_eq!(issuers, vec!["issuer:user-wallet", "issuer:merchant", "issuer:processor"]);
}

#[test]
fn scenario_2_full_refund() {
    let h = harness();
    let (root, payment) = payment_of(&h, &pay("500", "GBP", "Footlocker"));
    let summary = h.processor.refund(&refund(payment, "500", "GBP")).unwrap();
    assert_eq!(summary.state, ChainState::Refunded);

    let step = summary.last_of(MandateKind::Refund).unwrap();
    assert_eq!(step.prev_refs, vec![payment]);
    let txn = step.transaction.as_ref().unwrap();
    assert_eq!(txn.kind, TransactionKind::Refund);
    assert_eq!(txn.amount, amt("-500"));

    let report = h.processor.ledger().audit(&root).unwrap();
    assert!(report.consistent);
    assert!(report.net.is_zero());
}

#[test]
fn partial_refund_then_second_refund_rejected() {
    let h = harness();
    let (_, payment) = payment_of(&h, &pay("500", "GBP", "Footlocker"));
    h.processor.refund(&refund(payment, "120", "GBP")).unwrap();
    let err = h.processor.refund(&refund(payment, "10", "GBP")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[test]
fn refund_conservation_and_currency() {
    let h = harness();
    let (root, payment) = payment_of(&h, &pay("500", "GBP", "Footlocker"));
    let before = h.processor.ledger().len();

    let err = h.processor.refund(&refund(payment, "600", "GBP")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RefundExceedsOriginal);
    let err = h.processor.refund(&refund(payment, "500", "EUR")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CurrencyMismatch);

    assert_eq!(h.processor.ledger().len(), before);
    assert_eq!(h.processor.status(&root).unwrap().state(), ChainState::Payment);
}

#[test]
fn refund_of_unknown_payment_is_not_found() {
    let h = harness();
    let err = h.processor.refund(&refund(VcId::new(), "1", "GBP")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn scenario_3_netted_payment() {
    let h = harness();
    let request = pay("500000", "KRW", "CNY").with_settlement_run("DTP2");
    let summary = h.processor.pay(&request).unwrap();
    assert_eq!(
        summary.kinds(),
        vec![
            MandateKind::Intent,
            MandateKind::Cart,
            MandateKind::Netting,
            MandateKind::Netting,
            MandateKind::Payment,
        ]
    );
    let cart = summary.steps[1].vc_id;
    let settled = summary.steps[3].vc_id;
    let payment = summary.last_of(MandateKind::Payment).unwrap();
    assert_eq!(payment.prev_refs, vec![cart, settled]);

    let ancestry: Vec<MandateKind> = h
        .processor
        .ledger()
        .chain_of(&payment.vc_id)
        .unwrap()
        .iter()
        .map(|m| m.kind())
        .collect();
    assert_eq!(
        ancestry,
        vec![MandateKind::Intent, MandateKind::Cart, MandateKind::Netting, MandateKind::Payment]
    );

    let kinds: Vec<TransactionKind> = summary.transactions().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TransactionKind::Netting, TransactionKind::Payment]);
}

#[test]
fn scenario_3_payment_waits_for_netting() {
    let h = harness();
    let request = pay("500000", "KRW", "CNY").with_settlement_run("DTP2");
    let root = h.processor.open_intent(&request).unwrap();
    h.processor.confirm_cart(&root).unwrap();
    let pending = h.processor.request_netting(&root).unwrap();
    assert_eq!(pending.state, ChainState::NettingPending);

    let err = h.processor.finalize_payment(&root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NettingPending);

    let done = h.processor.complete_netting(&root).unwrap();
    assert_eq!(done.state, ChainState::NettingDone);
    let paid = h.processor.finalize_payment(&root).unwrap();
    assert_eq!(paid.state, ChainState::Payment);
}

#[test]
fn immediate_runs_skip_netting() {
    let h = harness();
    for run in ["MISC", "ADD1"] {
        let summary = h
            .processor
            .pay(&pay("75", "USD", "merchant-1").with_settlement_run(run))
            .unwrap();
        assert_eq!(
            summary.kinds(),
            vec![MandateKind::Intent, MandateKind::Cart, MandateKind::Payment]
        );
    }
}

#[test]
fn scenario_4_fraud_flag_on_payment() {
    let h = harness();
    let (root, payment) = payment_of(&h, &pay("500", "GBP", "Footlocker"));
    let mut evidence = BTreeMap::new();
    evidence.insert("ip".to_string(), "203.0.113.9".to_string());
    let summary = h
        .processor
        .flag_fraud(&FraudRequest {
            target: payment,
            reason: "Unauthorized".to_string(),
            evidence,
        })
        .unwrap();
    assert_eq!(summary.root, root);
    assert_eq!(summary.state, ChainState::FraudFlagged);

    let flag = summary.last_of(MandateKind::FraudFlag).unwrap();
    assert_eq!(flag.prev_refs, vec![payment]);
    let txn = flag.transaction.as_ref().unwrap();
    assert_eq!(txn.kind, TransactionKind::FraudNullify);
    assert!(txn.amount.is_zero());
    assert_eq!(txn.to.as_str(), "Footlocker");
    assert_eq!(txn.from.as_str(), "issuer:processor");
    assert_eq!(txn.currency, ccy("GBP"));

    // The flag does not block a later refund.
    let refunded = h.processor.refund(&refund(payment, "500", "GBP")).unwrap();
    assert_eq!(refunded.state, ChainState::FraudFlagged);
    assert!(h.processor.status(&root).unwrap().refund().is_some());
}

#[test]
fn fraud_flag_before_payment_uses_target() {
    let h = harness();
    let root = h.processor.open_intent(&pay("9", "JPY", "kiosk")).unwrap();
    let summary = h
        .processor
        .flag_fraud(&FraudRequest {
            target: root,
            reason: "Stolen card".to_string(),
            evidence: BTreeMap::new(),
        })
        .unwrap();
    let txn = summary.transactions().next().unwrap();
    assert_eq!(txn.currency, ccy("JPY"));
    assert_eq!(txn.to.as_str(), "kiosk");

    // Payment eligibility is unchanged.
    let paid = h.processor.resume(&root).unwrap();
    assert!(paid.last_of(MandateKind::Payment).is_some());
}

#[test]
fn scenario_5_second_payment_rejected() {
    let h = harness();
    let (root, _) = payment_of(&h, &pay("500", "GBP", "Footlocker"));
    let before = h.processor.ledger().len();
    let err = h.processor.finalize_payment(&root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    let err = h.processor.resume(&root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(h.processor.ledger().len(), before);
}

#[test]
fn exported_chain_validates_and_verifies() {
    let h = harness();
    let (root, payment) = payment_of(&h, &pay("500", "GBP", "Footlocker"));
    h.processor.refund(&refund(payment, "200", "GBP")).unwrap();

    let ledger = h.processor.ledger();
    let mandates = ledger.chain_entries(&root).unwrap().into_iter().map(|e| e.mandate).collect::<Vec<_>>();
    let export = ChainExport::build(&mandates, ledger.transactions_of(&root).unwrap()).unwrap();
    export.validate(&MandateSchema::load().unwrap()).unwrap();
    export.verify(|vm| h.keys.resolve(vm)).unwrap();

    let json = serde_json::to_value(&export).unwrap();
    assert_eq!(json["schema"], "https://ap2-protocol.org/schemas/mandate.v1.json");
    assert_eq!(json["credentials"].as_array().unwrap().len(), 4);
}
