//! # Settlement Service
//!
//! The netting step hands a requested payment to a settlement run and waits
//! for the net obligation. The call blocks; the processor holds only the
//! chain's own guard while it waits, never the ledger lock.

use ap2_core::{Amount, CurrencyCode, PartyId, VcId};
use serde::Serialize;
use thiserror::Error;

/// A payment submitted to a settlement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NettingRequest {
    /// Root of the chain being settled.
    pub chain: VcId,
    /// The committed netting-request mandate.
    pub request: VcId,
    pub run: String,
    pub payer: PartyId,
    pub counterparty: PartyId,
    /// Gross amount.
    pub amount: Amount,
    pub currency: CurrencyCode,
}

/// Result of a completed settlement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NettingOutcome {
    pub run: String,
    /// Net obligation of the payer in this run. May take either sign.
    pub net_amount: Amount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The run refused the payment.
    #[error("settlement run {run} rejected the payment: {reason}")]
    Rejected { run: String, reason: String },

    /// The run could not be reached or did not complete.
    #[error("settlement run {run} is unavailable")]
    Unavailable { run: String },
}

/// Completes netting for submitted payments.
pub trait SettlementService: Send + Sync {
    fn settle(&self, request: &NettingRequest) -> Result<NettingOutcome, SettlementError>;
}

/// Settles every request at once, with the gross amount as the net
/// obligation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateSettlement;

impl SettlementService for ImmediateSettlement {
    fn settle(&self, request: &NettingRequest) -> Result<NettingOutcome, SettlementError> {
        tracing::debug!(
            chain = %request.chain,
            run = %request.run,
            amount = %request.amount,
            "settled immediately"
        );
        Ok(NettingOutcome {
            run: request.run.clone(),
            net_amount: request.amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_settlement_nets_gross() {
        let request = NettingRequest {
            chain: VcId::new(),
            request: VcId::new(),
            run: "DTP2".to_string(),
            payer: PartyId::new("KRW").unwrap(),
            counterparty: PartyId::new("CNY").unwrap(),
            amount: "500000".parse().unwrap(),
            currency: CurrencyCode::new("KRW").unwrap(),
        };
        let outcome = ImmediateSettlement.settle(&request).unwrap();
        assert_eq!(outcome.run, "DTP2");
        assert_eq!(outcome.net_amount, request.amount);
    }
}
