//! # Requests
//!
//! Fully resolved, structured inputs to the processor. Parsing free text
//! into these happens elsewhere.

use std::collections::BTreeMap;

use ap2_core::{Amount, CurrencyCode, PartyId, VcId};
use serde::{Deserialize, Serialize};

/// Start a new chain and drive it to a Payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayRequest {
    /// Defaults to the configured payer.
    #[serde(default)]
    pub payer: Option<PartyId>,
    pub counterparty: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub note: String,
    /// Settlement run to batch into. Immediate runs and `None` skip
    /// netting.
    #[serde(default)]
    pub settlement_run: Option<String>,
}

impl PayRequest {
    pub fn new(counterparty: PartyId, amount: Amount, currency: CurrencyCode) -> Self {
        Self {
            payer: None,
            counterparty,
            amount,
            currency,
            note: String::new(),
            settlement_run: None,
        }
    }

    pub fn with_settlement_run(mut self, run: impl Into<String>) -> Self {
        self.settlement_run = Some(run.into());
        self
    }

    pub fn with_payer(mut self, payer: PartyId) -> Self {
        self.payer = Some(payer);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Refund (part of) a Payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundRequest {
    /// The Payment mandate being refunded.
    pub payment: VcId,
    /// Positive magnitude.
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub reason: String,
}

/// Raise a fraud flag against any committed mandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FraudRequest {
    pub target: VcId,
    pub reason: String,
    #[serde(default)]
    pub evidence: BTreeMap<String, String>,
}
