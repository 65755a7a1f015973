//! # Transactions
//!
//! A mandate with monetary effect carries exactly one [`Transaction`]. The
//! sign of the amount is fixed by the kind:
//!
//! | Kind            | Amount   |
//! |-----------------|----------|
//! | `payment`       | `> 0`    |
//! | `refund`        | `< 0`    |
//! | `fraud-nullify` | `== 0`   |
//! | `netting`       | any sign |

use std::fmt;

use ap2_core::{Amount, CurrencyCode, PartyId, Timestamp, TxnId, VcId};
use serde::{Deserialize, Serialize};

/// What a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    /// Settled transfer from payer to counterparty.
    Payment,
    /// Reversal of (part of) a payment.
    Refund,
    /// Zero-amount audit marker raised by a fraud flag.
    FraudNullify,
    /// Net obligation recorded by a settlement run.
    Netting,
}

impl TransactionKind {
    /// Whether `amount` has the sign this kind requires.
    pub fn admits(&self, amount: Amount) -> bool {
        match self {
            Self::Payment => amount.is_positive(),
            Self::Refund => amount.is_negative(),
            Self::FraudNullify => amount.is_zero(),
            Self::Netting => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Refund => "refund",
            Self::FraudNullify => "fraud-nullify",
            Self::Netting => "netting",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monetary record linked to the mandate that authorized it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub txn_id: TxnId,
    pub from: PartyId,
    pub to: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub kind: TransactionKind,
    /// The mandate this transaction belongs to.
    pub linked_mandate: VcId,
    pub timestamp: Timestamp,
}
