//! # Payment Processor
//!
//! Each step is plan → build → sign → commit, run under the chain's guard
//! so that two operations on one chain are linearized. Operations on
//! different chains only meet at the ledger's commit lock.
//!
//! The chain status is re-derived from the ledger every time the guard is
//! taken; the processor keeps no chain state between operations.

use std::fmt;
use std::sync::Arc;

use ap2_core::{IdentityProvider, VcId};
use ap2_ledger::{Ledger, LedgerError};
use ap2_mandate::{
    sign_mandate, CartSubject, FraudFlagSubject, IntentSubject, Mandate, MandateFactory,
    MandateKind, MandateSubject, NettingPhase, NettingSubject, PaymentSubject, RefundSubject,
    Signer,
};
use ap2_state::{ChainEngine, ChainError, ChainEvent, ChainStage, ChainStatus, Plan};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::request::{FraudRequest, PayRequest, RefundRequest};
use crate::settlement::{ImmediateSettlement, NettingRequest, SettlementService};
use crate::summary::ChainSummary;

/// A chain loaded under its guard.
struct Chain {
    status: ChainStatus,
    intent: IntentSubject,
}

/// Drives payment chains through the ledger.
pub struct PaymentProcessor {
    config: ProcessorConfig,
    ledger: Arc<Ledger>,
    signer: Arc<dyn Signer>,
    ids: Arc<dyn IdentityProvider>,
    settlement: Arc<dyn SettlementService>,
    factory: MandateFactory,
    engine: ChainEngine,
    chain_locks: DashMap<VcId, Arc<Mutex<()>>>,
}

impl fmt::Debug for PaymentProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProcessor")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("guarded_chains", &self.chain_locks.len())
            .finish()
    }
}

impl PaymentProcessor {
    /// A processor that settles netting immediately.
    pub fn new(
        config: ProcessorConfig,
        ledger: Arc<Ledger>,
        signer: Arc<dyn Signer>,
        ids: Arc<dyn IdentityProvider>,
    ) -> Self {
        let factory = MandateFactory::new(ids.clone(), config.issuers.clone(), config.mandate_ttl_secs);
        Self {
            config,
            ledger,
            signer,
            ids,
            settlement: Arc::new(ImmediateSettlement),
            factory,
            engine: ChainEngine,
            chain_locks: DashMap::new(),
        }
    }

    /// Replace the settlement service.
    pub fn with_settlement(mut self, settlement: Arc<dyn SettlementService>) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    // ─── Reads ──────────────────────────────────────────────────────

    /// Status of the chain containing `vc_id`.
    pub fn status(&self, vc_id: &VcId) -> Result<ChainStatus, ProcessorError> {
        let root = self.ledger.chain_root(vc_id)?;
        Ok(self.load(root)?.status)
    }

    /// Summary of the chain containing `vc_id`.
    pub fn summary(&self, vc_id: &VcId) -> Result<ChainSummary, ProcessorError> {
        let root = self.ledger.chain_root(vc_id)?;
        let chain = self.load(root)?;
        self.summarize(&chain)
    }

    // ─── Operations ─────────────────────────────────────────────────

    /// Start a chain and drive it to its Payment.
    ///
    /// Intent and Cart are committed first. Runs that do not settle
    /// immediately then commit a netting request, wait for the settlement
    /// service, and commit the settled marker before the Payment. A failing
    /// step leaves the earlier commits in place.
    pub fn pay(&self, request: &PayRequest) -> Result<ChainSummary, ProcessorError> {
        let root = self.open_intent(request)?;
        self.with_chain(root, |chain| {
            self.advance(chain)?;
            self.summarize(chain)
        })
    }

    /// Commit only the root Intent. Returns the new chain's root.
    pub fn open_intent(&self, request: &PayRequest) -> Result<VcId, ProcessorError> {
        let plan = self.engine.plan_root();
        let subject = MandateSubject::Intent(IntentSubject {
            payer: request.payer.clone().unwrap_or_else(|| self.config.payer.clone()),
            counterparty: request.counterparty.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            note: request.note.clone(),
            settlement_run: request.settlement_run.clone(),
        });
        let intent = self.commit_new(plan.prev_refs, subject)?;
        tracing::info!(
            chain = %intent.vc_id(),
            counterparty = %request.counterparty,
            amount = %request.amount,
            currency = %request.currency,
            "opened payment chain"
        );
        Ok(intent.vc_id())
    }

    /// Drive an existing chain from wherever it stands to its Payment.
    ///
    /// A chain that already has its Payment fails with
    /// [`ChainError::InvalidTransition`].
    pub fn resume(&self, root: &VcId) -> Result<ChainSummary, ProcessorError> {
        self.with_chain(*root, |chain| {
            self.advance(chain)?;
            self.summarize(chain)
        })
    }

    pub fn confirm_cart(&self, root: &VcId) -> Result<ChainSummary, ProcessorError> {
        self.with_chain(*root, |chain| {
            self.cart_step(chain)?;
            self.summarize(chain)
        })
    }

    pub fn request_netting(&self, root: &VcId) -> Result<ChainSummary, ProcessorError> {
        self.with_chain(*root, |chain| {
            self.netting_request_step(chain)?;
            self.summarize(chain)
        })
    }

    /// Wait for the settlement run and commit the settled marker.
    pub fn complete_netting(&self, root: &VcId) -> Result<ChainSummary, ProcessorError> {
        self.with_chain(*root, |chain| {
            self.netting_settled_step(chain)?;
            self.summarize(chain)
        })
    }

    /// Commit the Payment. While netting is outstanding this fails with
    /// [`ChainError::NettingPending`].
    pub fn finalize_payment(&self, root: &VcId) -> Result<ChainSummary, ProcessorError> {
        self.with_chain(*root, |chain| {
            self.payment_step(chain)?;
            self.summarize(chain)
        })
    }

    /// Refund (part of) a Payment.
    pub fn refund(&self, request: &RefundRequest) -> Result<ChainSummary, ProcessorError> {
        let entry = self.ledger.lookup(&request.payment)?;
        let MandateSubject::Payment(payment) = entry.mandate.subject() else {
            return Err(ProcessorError::NotAPayment {
                vc_id: request.payment,
                kind: entry.mandate.kind(),
            });
        };
        self.with_chain(request.payment, |chain| {
            self.extend(&mut chain.status, ChainEvent::Refund, None, |_| {
                Ok(MandateSubject::Refund(RefundSubject {
                    original_payment: request.payment,
                    payer: payment.payer.clone(),
                    counterparty: payment.counterparty.clone(),
                    amount: request.amount,
                    currency: request.currency.clone(),
                    reason: request.reason.clone(),
                }))
            })?;
            self.summarize(chain)
        })
    }

    /// Flag any committed mandate as fraudulent.
    ///
    /// Counterparty and currency come from the nearest Payment at or above
    /// the target, or from the target itself when there is none.
    pub fn flag_fraud(&self, request: &FraudRequest) -> Result<ChainSummary, ProcessorError> {
        self.with_chain(request.target, |chain| {
            let ancestors = self.ledger.chain_of(&request.target)?;
            let reference = ancestors
                .iter()
                .rev()
                .find(|m| m.kind() == MandateKind::Payment)
                .or(ancestors.last())
                .ok_or(LedgerError::NotFound {
                    vc_id: request.target,
                })?;
            let counterparty = reference.subject().counterparty().clone();
            let currency = reference.subject().currency().clone();
            self.extend(&mut chain.status, ChainEvent::FlagFraud, Some(request.target), |_| {
                Ok(MandateSubject::FraudFlag(FraudFlagSubject {
                    flagged: request.target,
                    counterparty,
                    currency,
                    reason: request.reason.clone(),
                    evidence: request.evidence.clone(),
                }))
            })?;
            tracing::warn!(
                chain = %chain.status.root(),
                target = %request.target,
                reason = %request.reason,
                "fraud flag raised"
            );
            self.summarize(chain)
        })
    }

    // ─── Steps ──────────────────────────────────────────────────────

    fn advance(&self, chain: &mut Chain) -> Result<(), ProcessorError> {
        loop {
            match chain.status.stage() {
                ChainStage::Intent => self.cart_step(chain)?,
                ChainStage::Cart if self.needs_netting(chain) => self.netting_request_step(chain)?,
                ChainStage::NettingPending => self.netting_settled_step(chain)?,
                ChainStage::Cart | ChainStage::NettingDone | ChainStage::Payment | ChainStage::Refunded => {
                    return self.payment_step(chain);
                }
            }
        }
    }

    fn needs_netting(&self, chain: &Chain) -> bool {
        !self
            .config
            .settles_immediately(chain.intent.settlement_run.as_deref())
    }

    fn cart_step(&self, chain: &mut Chain) -> Result<(), ProcessorError> {
        let intent = &chain.intent;
        self.extend(&mut chain.status, ChainEvent::ConfirmCart, None, |_| {
            let description = if intent.note.is_empty() {
                format!("Order from {}", intent.counterparty)
            } else {
                intent.note.clone()
            };
            Ok(MandateSubject::Cart(CartSubject {
                payer: intent.payer.clone(),
                counterparty: intent.counterparty.clone(),
                amount: intent.amount,
                currency: intent.currency.clone(),
                description,
            }))
        })?;
        Ok(())
    }

    fn netting_request_step(&self, chain: &mut Chain) -> Result<(), ProcessorError> {
        let intent = &chain.intent;
        self.extend(&mut chain.status, ChainEvent::RequestNetting, None, |_| {
            Ok(MandateSubject::Netting(NettingSubject {
                phase: NettingPhase::Requested,
                payer: intent.payer.clone(),
                counterparty: intent.counterparty.clone(),
                amount: intent.amount,
                currency: intent.currency.clone(),
                settlement_run: intent.settlement_run.clone().unwrap_or_default(),
            }))
        })?;
        Ok(())
    }

    fn netting_settled_step(&self, chain: &mut Chain) -> Result<(), ProcessorError> {
        let root = chain.status.root();
        let Some(requested) = chain.status.netting_request() else {
            return Err(ChainError::InvalidTransition {
                state: chain.status.state(),
                event: ChainEvent::CompleteNetting,
            }
            .into());
        };
        let intent = &chain.intent;
        self.extend(&mut chain.status, ChainEvent::CompleteNetting, None, |_| {
            let request = NettingRequest {
                chain: root,
                request: requested,
                run: intent.settlement_run.clone().unwrap_or_default(),
                payer: intent.payer.clone(),
                counterparty: intent.counterparty.clone(),
                amount: intent.amount,
                currency: intent.currency.clone(),
            };
            let outcome = self.settlement.settle(&request).map_err(|source| {
                tracing::warn!(chain = %root, run = %request.run, error = %source, "netting failed");
                ProcessorError::Settlement { chain: root, source }
            })?;
            Ok(MandateSubject::Netting(NettingSubject {
                phase: NettingPhase::Settled,
                payer: intent.payer.clone(),
                counterparty: intent.counterparty.clone(),
                amount: outcome.net_amount,
                currency: intent.currency.clone(),
                settlement_run: outcome.run,
            }))
        })?;
        Ok(())
    }

    fn payment_step(&self, chain: &mut Chain) -> Result<(), ProcessorError> {
        let intent = &chain.intent;
        self.extend(&mut chain.status, ChainEvent::FinalizePayment, None, |plan| {
            let cart_id = plan.prev_refs.first().copied().ok_or(ChainError::EmptyChain)?;
            let cart = self.ledger.lookup(&cart_id)?.mandate;
            let MandateSubject::Cart(confirmed) = cart.subject() else {
                return Err(ProcessorError::from(LedgerError::InvalidLinkage {
                    vc_id: cart_id,
                    reason: format!("expected a cart, found {}", cart.kind()),
                }));
            };
            Ok(MandateSubject::Payment(PaymentSubject {
                txn_id: self.ids.txn_id(),
                payer: confirmed.payer.clone(),
                counterparty: confirmed.counterparty.clone(),
                amount: confirmed.amount,
                currency: confirmed.currency.clone(),
                cart_digest: cart.content_digest()?,
                note: intent.note.clone(),
            }))
        })?;
        Ok(())
    }

    // ─── Plumbing ───────────────────────────────────────────────────

    /// Plan `event`, build the subject for the plan, then sign and commit.
    fn extend<F>(
        &self,
        status: &mut ChainStatus,
        event: ChainEvent,
        target: Option<VcId>,
        subject: F,
    ) -> Result<Mandate, ProcessorError>
    where
        F: FnOnce(&Plan) -> Result<MandateSubject, ProcessorError>,
    {
        let plan = self.engine.plan(status, event, target)?;
        let subject = subject(&plan)?;
        let mandate = self.commit_new(plan.prev_refs, subject)?;
        status.apply(&mandate)?;
        tracing::info!(
            chain = %status.root(),
            event = %event,
            vc_id = %mandate.vc_id(),
            state = %status.state(),
            "chain advanced"
        );
        Ok(mandate)
    }

    fn commit_new(&self, prev_refs: Vec<VcId>, subject: MandateSubject) -> Result<Mandate, ProcessorError> {
        let mut mandate = self.factory.build(prev_refs, subject)?;
        sign_mandate(self.signer.as_ref(), &mut mandate, self.ids.now())?;
        let transaction = self.factory.transaction_for(&mandate)?;
        self.ledger.commit(mandate.clone(), transaction)?;
        Ok(mandate)
    }

    /// Run `f` on the chain containing `vc_id` under that chain's guard.
    ///
    /// A guard lives in `chain_locks` only while some caller holds or waits
    /// on it. The entry is removed after the guard is released, and only if
    /// the map and this caller are its last owners.
    fn with_chain<T, F>(&self, vc_id: VcId, f: F) -> Result<T, ProcessorError>
    where
        F: FnOnce(&mut Chain) -> Result<T, ProcessorError>,
    {
        let root = self.ledger.chain_root(&vc_id)?;
        let lock = Arc::clone(&self.chain_locks.entry(root).or_default());
        let result = {
            let _guard = lock.lock();
            self.load(root).and_then(|mut chain| f(&mut chain))
        };
        self.chain_locks.remove_if(&root, |_, held| Arc::strong_count(held) == 2);
        result
    }

    fn load(&self, root: VcId) -> Result<Chain, ProcessorError> {
        let entries = self.ledger.chain_entries(&root)?;
        let status = ChainStatus::replay(entries.iter().map(|e| &e.mandate))?;
        let intent = match entries.first().map(|e| e.mandate.subject()) {
            Some(MandateSubject::Intent(intent)) => intent.clone(),
            _ => return Err(ChainError::EmptyChain.into()),
        };
        Ok(Chain { status, intent })
    }

    fn summarize(&self, chain: &Chain) -> Result<ChainSummary, ProcessorError> {
        let entries = self.ledger.chain_entries(&chain.status.root())?;
        Ok(ChainSummary::new(&chain.status, &entries))
    }
}
