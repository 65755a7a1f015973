//! # Chain Engine
//!
//! The transition table:
//!
//! | From              | Event             | To                | Links to          |
//! |-------------------|-------------------|-------------------|-------------------|
//! | (none)            | create intent     | `INTENT`          | nothing           |
//! | `INTENT`          | confirm cart      | `CART`            | Intent            |
//! | `CART`            | request netting   | `NETTING_PENDING` | Cart              |
//! | `NETTING_PENDING` | complete netting  | `NETTING_DONE`    | Cart              |
//! | `CART`            | finalize payment  | `PAYMENT`         | Cart              |
//! | `NETTING_DONE`    | finalize payment  | `PAYMENT`         | Cart, Netting     |
//! | `PAYMENT`         | refund            | `REFUNDED`        | Payment           |
//! | any               | flag fraud        | `FRAUD_FLAGGED`   | the flagged one   |
//!
//! Everything else is [`ChainError::InvalidTransition`], except a payment
//! requested while netting is outstanding, which is
//! [`ChainError::NettingPending`].

use ap2_core::VcId;
use serde::Serialize;

use crate::chain::{ChainError, ChainEvent, ChainStage, ChainState, ChainStatus};

/// What the next mandate must look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub event: ChainEvent,
    /// State before the event; `None` for a new chain.
    pub from: Option<ChainState>,
    /// Reported state after the event.
    pub to: ChainState,
    /// Lifecycle stage after the event.
    pub stage: ChainStage,
    /// Predecessors the new mandate must reference, in order.
    pub prev_refs: Vec<VcId>,
}

/// Stateless policy over [`ChainStatus`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainEngine;

impl ChainEngine {
    /// Plan a new chain.
    pub fn plan_root(&self) -> Plan {
        Plan {
            event: ChainEvent::CreateIntent,
            from: None,
            to: ChainState::Intent,
            stage: ChainStage::Intent,
            prev_refs: Vec::new(),
        }
    }

    /// Decide whether `event` may extend the chain.
    ///
    /// `target` is the mandate a fraud flag is raised against; when omitted
    /// the flag attaches to the chain's latest mandate. Other events ignore
    /// it.
    pub fn plan(
        &self,
        status: &ChainStatus,
        event: ChainEvent,
        target: Option<VcId>,
    ) -> Result<Plan, ChainError> {
        let from = status.state();
        let invalid = || ChainError::InvalidTransition { state: from, event };

        let (stage, prev_refs) = match (event, status.stage()) {
            (ChainEvent::ConfirmCart, ChainStage::Intent) => (ChainStage::Cart, vec![status.intent()]),
            (ChainEvent::RequestNetting, ChainStage::Cart) => {
                (ChainStage::NettingPending, vec![status.cart().ok_or_else(invalid)?])
            }
            (ChainEvent::CompleteNetting, ChainStage::NettingPending) => {
                (ChainStage::NettingDone, vec![status.cart().ok_or_else(invalid)?])
            }
            (ChainEvent::FinalizePayment, ChainStage::Cart) => {
                (ChainStage::Payment, vec![status.cart().ok_or_else(invalid)?])
            }
            (ChainEvent::FinalizePayment, ChainStage::NettingDone) => {
                let cart = status.cart().ok_or_else(invalid)?;
                let netting = status.netting().ok_or_else(invalid)?;
                (ChainStage::Payment, vec![cart, netting])
            }
            (ChainEvent::FinalizePayment, ChainStage::NettingPending) => {
                return Err(ChainError::NettingPending { chain: status.root() });
            }
            (ChainEvent::Refund, ChainStage::Payment) => {
                (ChainStage::Refunded, vec![status.payment().ok_or_else(invalid)?])
            }
            (ChainEvent::FlagFraud, stage) => {
                let flagged = target.unwrap_or_else(|| status.head());
                if !status.contains(&flagged) {
                    return Err(ChainError::NotInChain {
                        chain: status.root(),
                        target: flagged,
                    });
                }
                (stage, vec![flagged])
            }
            _ => return Err(invalid()),
        };

        let to = if event == ChainEvent::FlagFraud || status.is_fraud_flagged() {
            ChainState::FraudFlagged
        } else {
            stage.into()
        };
        let plan = Plan {
            event,
            from: Some(from),
            to,
            stage,
            prev_refs,
        };
        tracing::debug!(
            chain = %status.root(),
            event = %event,
            from = %from,
            to = %plan.to,
            "planned chain transition"
        );
        Ok(plan)
    }
}
