//! # Chain Status
//!
//! Events, lifecycle stages, and the status of one chain as derived from
//! its committed mandates.

use std::fmt;

use ap2_core::VcId;
use ap2_mandate::{Mandate, MandateSubject, NettingPhase};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::ChainEngine;

// ─── Events ─────────────────────────────────────────────────────────

/// A request to extend a chain. Each event produces one mandate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainEvent {
    CreateIntent,
    ConfirmCart,
    RequestNetting,
    CompleteNetting,
    FinalizePayment,
    Refund,
    FlagFraud,
}

impl ChainEvent {
    /// The event a committed mandate records.
    pub fn of(mandate: &Mandate) -> Self {
        match mandate.subject() {
            MandateSubject::Intent(_) => Self::CreateIntent,
            MandateSubject::Cart(_) => Self::ConfirmCart,
            MandateSubject::Netting(n) => match n.phase {
                NettingPhase::Requested => Self::RequestNetting,
                NettingPhase::Settled => Self::CompleteNetting,
            },
            MandateSubject::Payment(_) => Self::FinalizePayment,
            MandateSubject::Refund(_) => Self::Refund,
            MandateSubject::FraudFlag(_) => Self::FlagFraud,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateIntent => "create intent",
            Self::ConfirmCart => "confirm cart",
            Self::RequestNetting => "request netting",
            Self::CompleteNetting => "complete netting",
            Self::FinalizePayment => "finalize payment",
            Self::Refund => "refund",
            Self::FlagFraud => "flag fraud",
        }
    }
}

impl fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── States ─────────────────────────────────────────────────────────

/// Lifecycle stage. A fraud flag does not move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStage {
    Intent,
    Cart,
    NettingPending,
    NettingDone,
    Payment,
    Refunded,
}

/// Reported chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainState {
    Intent,
    Cart,
    NettingPending,
    NettingDone,
    Payment,
    Refunded,
    FraudFlagged,
}

impl ChainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "INTENT",
            Self::Cart => "CART",
            Self::NettingPending => "NETTING_PENDING",
            Self::NettingDone => "NETTING_DONE",
            Self::Payment => "PAYMENT",
            Self::Refunded => "REFUNDED",
            Self::FraudFlagged => "FRAUD_FLAGGED",
        }
    }
}

impl From<ChainStage> for ChainState {
    fn from(stage: ChainStage) -> Self {
        match stage {
            ChainStage::Intent => Self::Intent,
            ChainStage::Cart => Self::Cart,
            ChainStage::NettingPending => Self::NettingPending,
            ChainStage::NettingDone => Self::NettingDone,
            ChainStage::Payment => Self::Payment,
            ChainStage::Refunded => Self::Refunded,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ChainState::from(*self).fmt(f)
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors from planning or replaying a chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The event is not allowed in the chain's current state.
    #[error("cannot {event} in state {state}")]
    InvalidTransition { state: ChainState, event: ChainEvent },

    /// A payment was requested while the chain waits for its settlement run.
    #[error("chain {chain} is waiting for netting to complete")]
    NettingPending { chain: VcId },

    /// There is nothing to replay.
    #[error("a chain needs at least its root intent")]
    EmptyChain,

    /// Only an Intent can start a chain.
    #[error("a chain must start with an intent, not {event}")]
    NoChain { event: ChainEvent },

    /// A fraud flag names a mandate outside the chain.
    #[error("mandate {target} is not part of chain {chain}")]
    NotInChain { chain: VcId, target: VcId },

    /// A replayed mandate links to something other than what the state
    /// machine requires.
    #[error("mandate {vc_id} links to {actual:?}, expected {expected:?}")]
    UnexpectedLinkage {
        vc_id: VcId,
        expected: Vec<VcId>,
        actual: Vec<VcId>,
    },
}

// ─── Status ─────────────────────────────────────────────────────────

/// Where one chain stands, and which mandate fills each role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    root: VcId,
    stage: ChainStage,
    fraud_flagged: bool,
    cart: Option<VcId>,
    netting_request: Option<VcId>,
    netting: Option<VcId>,
    payment: Option<VcId>,
    refund: Option<VcId>,
    members: Vec<VcId>,
}

impl ChainStatus {
    /// Status of a chain that holds only its root Intent.
    pub fn started(root: VcId) -> Self {
        Self {
            root,
            stage: ChainStage::Intent,
            fraud_flagged: false,
            cart: None,
            netting_request: None,
            netting: None,
            payment: None,
            refund: None,
            members: vec![root],
        }
    }

    /// Derive the status from a chain's mandates in commit order.
    ///
    /// # Errors
    ///
    /// Any mandate that the state machine would not have allowed, or that
    /// links to the wrong predecessors, aborts the replay.
    pub fn replay<'a, I>(mandates: I) -> Result<Self, ChainError>
    where
        I: IntoIterator<Item = &'a Mandate>,
    {
        let mut iter = mandates.into_iter();
        let root = iter
            .next()
            .ok_or(ChainError::EmptyChain)?;
        let event = ChainEvent::of(root);
        if event != ChainEvent::CreateIntent || !root.is_root() {
            return Err(ChainError::NoChain { event });
        }
        let mut status = Self::started(root.vc_id());
        for mandate in iter {
            status.apply(mandate)?;
        }
        Ok(status)
    }

    /// Advance by one committed mandate.
    pub fn apply(&mut self, mandate: &Mandate) -> Result<(), ChainError> {
        let event = ChainEvent::of(mandate);
        let target = match mandate.subject() {
            MandateSubject::FraudFlag(f) => Some(f.flagged),
            _ => None,
        };
        let plan = ChainEngine.plan(self, event, target)?;
        if plan.prev_refs != mandate.prev_refs() {
            return Err(ChainError::UnexpectedLinkage {
                vc_id: mandate.vc_id(),
                expected: plan.prev_refs,
                actual: mandate.prev_refs().to_vec(),
            });
        }
        let vc_id = mandate.vc_id();
        match event {
            ChainEvent::CreateIntent => {}
            ChainEvent::ConfirmCart => self.cart = Some(vc_id),
            ChainEvent::RequestNetting => self.netting_request = Some(vc_id),
            ChainEvent::CompleteNetting => self.netting = Some(vc_id),
            ChainEvent::FinalizePayment => self.payment = Some(vc_id),
            ChainEvent::Refund => self.refund = Some(vc_id),
            ChainEvent::FlagFraud => self.fraud_flagged = true,
        }
        self.stage = plan.stage;
        self.members.push(vc_id);
        Ok(())
    }

    pub fn root(&self) -> VcId {
        self.root
    }

    pub fn stage(&self) -> ChainStage {
        self.stage
    }

    /// The reported state: `FRAUD_FLAGGED` once any flag is raised,
    /// otherwise the lifecycle stage.
    pub fn state(&self) -> ChainState {
        if self.fraud_flagged {
            ChainState::FraudFlagged
        } else {
            self.stage.into()
        }
    }

    pub fn is_fraud_flagged(&self) -> bool {
        self.fraud_flagged
    }

    pub fn intent(&self) -> VcId {
        self.root
    }

    pub fn cart(&self) -> Option<VcId> {
        self.cart
    }

    pub fn netting_request(&self) -> Option<VcId> {
        self.netting_request
    }

    /// The settled-netting marker, once the settlement run completed.
    pub fn netting(&self) -> Option<VcId> {
        self.netting
    }

    pub fn payment(&self) -> Option<VcId> {
        self.payment
    }

    pub fn refund(&self) -> Option<VcId> {
        self.refund
    }

    /// Every mandate of the chain, in commit order.
    pub fn members(&self) -> &[VcId] {
        &self.members
    }

    pub fn contains(&self, vc_id: &VcId) -> bool {
        self.members.contains(vc_id)
    }

    /// The most recently committed mandate.
    pub fn head(&self) -> VcId {
        self.members.last().copied().unwrap_or(self.root)
    }
}
