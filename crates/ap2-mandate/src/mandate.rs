//! # Mandate Model
//!
//! A mandate is one immutable, signed step of a payment chain. The set of
//! mandate kinds is closed; each kind carries exactly the subject fields it
//! needs.
//!
//! ## Identity
//!
//! `mandate_id` is the record identity. `vc_id` is the identity of the
//! credential envelope and is the only identifier other mandates reference
//! through `prev_refs`.
//!
//! ## Signing Input
//!
//! A mandate is signed in its credential form (see [`Mandate::to_credential`])
//! with the proof removed. The same bytes are recomputed at verification, in
//! the ledger and in exported chains alike.

use std::collections::BTreeMap;
use std::fmt;

use ap2_core::{
    sha256_digest, Amount, CanonicalBytes, ContentDigest, CurrencyCode, IssuerId, MandateId,
    PartyId, TxnId, ValidityWindow, VcId,
};
use ap2_vc::{CredentialSchemaRef, Proof, VcError, VerifiableCredential, MANDATE_CONTEXTS};
use serde::{Deserialize, Serialize};

// ─── Kinds ──────────────────────────────────────────────────────────

/// The closed set of mandate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateKind {
    /// User intent to pay. Chain root.
    Intent,
    /// Merchant checkout confirmation.
    Cart,
    /// Netting request or settlement marker.
    Netting,
    /// Finalized payment.
    Payment,
    /// Refund of a payment.
    Refund,
    /// Fraud flag on any mandate.
    FraudFlag,
}

impl MandateKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [MandateKind; 6] = [
        MandateKind::Intent,
        MandateKind::Cart,
        MandateKind::Netting,
        MandateKind::Payment,
        MandateKind::Refund,
        MandateKind::FraudFlag,
    ];

    /// Lower-case name, matching the serialized `kind` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Cart => "cart",
            Self::Netting => "netting",
            Self::Payment => "payment",
            Self::Refund => "refund",
            Self::FraudFlag => "fraud_flag",
        }
    }

    /// Credential type name used in the exported `type` array.
    pub fn credential_type(&self) -> &'static str {
        match self {
            Self::Intent => "IntentMandate",
            Self::Cart => "CartMandate",
            Self::Netting => "NettingMandate",
            Self::Payment => "PaymentMandate",
            Self::Refund => "RefundMandate",
            Self::FraudFlag => "FraudFlag",
        }
    }
}

impl fmt::Display for MandateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Subjects ───────────────────────────────────────────────────────

/// User intent to pay `amount` to `counterparty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentSubject {
    pub payer: PartyId,
    pub counterparty: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub note: String,
    /// Settlement run the payment should be batched into, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_run: Option<String>,
}

/// Merchant confirmation of the cart total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CartSubject {
    pub payer: PartyId,
    pub counterparty: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub description: String,
}

/// Which half of the netting step a Netting mandate records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NettingPhase {
    /// The payment was submitted to a settlement run.
    Requested,
    /// The settlement run completed; carries the net obligation.
    Settled,
}

/// Netting request or settlement marker.
///
/// `amount` is the gross amount when requested and the net obligation
/// once settled. A net obligation may take either sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NettingSubject {
    pub phase: NettingPhase,
    pub payer: PartyId,
    pub counterparty: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub settlement_run: String,
}

/// Finalized payment, bound to its Cart by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentSubject {
    pub txn_id: TxnId,
    pub payer: PartyId,
    pub counterparty: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    /// Digest of the signed Cart mandate this payment settles.
    pub cart_digest: ContentDigest,
    #[serde(default)]
    pub note: String,
}

/// Refund of (part of) a payment. `amount` is the positive magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundSubject {
    pub original_payment: VcId,
    pub payer: PartyId,
    pub counterparty: PartyId,
    pub amount: Amount,
    pub currency: CurrencyCode,
    pub reason: String,
}

/// Fraud flag raised against any mandate in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FraudFlagSubject {
    pub flagged: VcId,
    pub counterparty: PartyId,
    pub currency: CurrencyCode,
    pub reason: String,
    #[serde(default)]
    pub evidence: BTreeMap<String, String>,
}

/// Variant-specific mandate payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MandateSubject {
    Intent(IntentSubject),
    Cart(CartSubject),
    Netting(NettingSubject),
    Payment(PaymentSubject),
    Refund(RefundSubject),
    FraudFlag(FraudFlagSubject),
}

impl MandateSubject {
    /// The mandate kind this subject belongs to.
    pub fn kind(&self) -> MandateKind {
        match self {
            Self::Intent(_) => MandateKind::Intent,
            Self::Cart(_) => MandateKind::Cart,
            Self::Netting(_) => MandateKind::Netting,
            Self::Payment(_) => MandateKind::Payment,
            Self::Refund(_) => MandateKind::Refund,
            Self::FraudFlag(_) => MandateKind::FraudFlag,
        }
    }

    /// The receiving party.
    pub fn counterparty(&self) -> &PartyId {
        match self {
            Self::Intent(s) => &s.counterparty,
            Self::Cart(s) => &s.counterparty,
            Self::Netting(s) => &s.counterparty,
            Self::Payment(s) => &s.counterparty,
            Self::Refund(s) => &s.counterparty,
            Self::FraudFlag(s) => &s.counterparty,
        }
    }

    /// The currency the subject is denominated in.
    pub fn currency(&self) -> &CurrencyCode {
        match self {
            Self::Intent(s) => &s.currency,
            Self::Cart(s) => &s.currency,
            Self::Netting(s) => &s.currency,
            Self::Payment(s) => &s.currency,
            Self::Refund(s) => &s.currency,
            Self::FraudFlag(s) => &s.currency,
        }
    }

    /// The subject amount. FraudFlag has none.
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::Intent(s) => Some(s.amount),
            Self::Cart(s) => Some(s.amount),
            Self::Netting(s) => Some(s.amount),
            Self::Payment(s) => Some(s.amount),
            Self::Refund(s) => Some(s.amount),
            Self::FraudFlag(_) => None,
        }
    }
}

// ─── Mandate ────────────────────────────────────────────────────────

/// One step of a payment chain.
///
/// Built by [`crate::MandateFactory`], signed once, then owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mandate {
    mandate_id: MandateId,
    vc_id: VcId,
    issuer: IssuerId,
    window: ValidityWindow,
    prev_refs: Vec<VcId>,
    subject: MandateSubject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proof: Option<Proof>,
}

#[derive(Serialize)]
struct CredentialSubjectView<'a> {
    mandate_id: MandateId,
    prev_refs: &'a [VcId],
    #[serde(flatten)]
    subject: &'a MandateSubject,
}

impl Mandate {
    pub(crate) fn new(
        mandate_id: MandateId,
        vc_id: VcId,
        issuer: IssuerId,
        window: ValidityWindow,
        prev_refs: Vec<VcId>,
        subject: MandateSubject,
    ) -> Self {
        Self {
            mandate_id,
            vc_id,
            issuer,
            window,
            prev_refs,
            subject,
            proof: None,
        }
    }

    pub fn mandate_id(&self) -> MandateId {
        self.mandate_id
    }

    pub fn vc_id(&self) -> VcId {
        self.vc_id
    }

    pub fn issuer(&self) -> &IssuerId {
        &self.issuer
    }

    pub fn window(&self) -> ValidityWindow {
        self.window
    }

    /// Predecessor credentials, in order. Empty only for Intents.
    pub fn prev_refs(&self) -> &[VcId] {
        &self.prev_refs
    }

    pub fn subject(&self) -> &MandateSubject {
        &self.subject
    }

    pub fn kind(&self) -> MandateKind {
        self.subject.kind()
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    /// Whether this mandate starts a chain.
    pub fn is_root(&self) -> bool {
        self.prev_refs.is_empty()
    }

    /// The settled-netting subject, if this is a settlement marker.
    pub fn settled_netting(&self) -> Option<&NettingSubject> {
        match &self.subject {
            MandateSubject::Netting(n) if n.phase == NettingPhase::Settled => Some(n),
            _ => None,
        }
    }

    /// The mandate in its exported credential form.
    pub fn to_credential(&self) -> Result<VerifiableCredential, VcError> {
        let credential_subject = serde_json::to_value(CredentialSubjectView {
            mandate_id: self.mandate_id,
            prev_refs: &self.prev_refs,
            subject: &self.subject,
        })?;
        Ok(VerifiableCredential {
            context: MANDATE_CONTEXTS.iter().map(|c| c.to_string()).collect(),
            id: self.vc_id,
            credential_type: vec![
                "VerifiableCredential".to_string(),
                self.kind().credential_type().to_string(),
            ],
            issuer: self.issuer.clone(),
            issuance_date: self.window.issuance(),
            expiration_date: self.window.expiration(),
            credential_schema: CredentialSchemaRef::mandate_v1(),
            credential_subject,
            proof: self.proof.clone(),
        })
    }

    /// Canonical bytes that the proof signs: the credential form without
    /// its proof.
    pub fn signing_input(&self) -> Result<CanonicalBytes, VcError> {
        self.to_credential()?.signing_input()
    }

    /// Digest of the full signed credential, proof included.
    ///
    /// A Payment records its Cart's digest; any later change to the Cart
    /// record breaks the binding.
    pub fn content_digest(&self) -> Result<ContentDigest, VcError> {
        let canonical = CanonicalBytes::new(&self.to_credential()?)?;
        Ok(sha256_digest(&canonical))
    }

    /// Attach the proof. A mandate is signed exactly once.
    pub fn attach_proof(&mut self, proof: Proof) -> Result<(), VcError> {
        if self.proof.is_some() {
            return Err(VcError::AlreadySigned { vc_id: self.vc_id });
        }
        self.proof = Some(proof);
        Ok(())
    }
}
