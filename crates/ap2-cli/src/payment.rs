//! # Payment Subcommands
//!
//! `pay`, `refund` and `flag` map their flags onto the processor's request
//! types one-to-one. A processor rejection is printed as a structured error
//! and exits with [`crate::EXIT_REJECTED`]; anything else is a failure of
//! the tool itself.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{anyhow, Result};
use ap2_core::{Amount, CurrencyCode, PartyId, VcId};
use ap2_processor::{ChainSummary, FraudRequest, PayRequest, ProcessorError, RefundRequest};
use clap::Args;
use serde_json::json;

use crate::context::Context;
use crate::{write_json, EXIT_REJECTED};

/// Start a chain and drive it to its Payment.
#[derive(Args, Debug)]
pub struct PayArgs {
    /// Merchant or payee.
    #[arg(long = "to")]
    pub counterparty: PartyId,

    #[arg(long)]
    pub amount: Amount,

    /// ISO 4217 code.
    #[arg(long)]
    pub currency: CurrencyCode,

    /// Paying party; defaults to the configured payer.
    #[arg(long)]
    pub payer: Option<PartyId>,

    /// Free-form description carried on the Intent and Cart.
    #[arg(long, default_value = "")]
    pub note: String,

    /// Settlement run to net through.
    #[arg(long = "run")]
    pub settlement_run: Option<String>,
}

/// Refund (part of) a Payment.
#[derive(Args, Debug)]
pub struct RefundArgs {
    /// The Payment mandate's credential id.
    pub payment: VcId,

    #[arg(long)]
    pub amount: Amount,

    #[arg(long)]
    pub currency: CurrencyCode,

    #[arg(long)]
    pub reason: String,
}

/// Raise a fraud flag against a mandate.
#[derive(Args, Debug)]
pub struct FlagArgs {
    /// Credential id of the flagged mandate.
    pub target: VcId,

    #[arg(long)]
    pub reason: String,

    /// Supporting evidence as `key=value`. Repeatable.
    #[arg(long = "evidence", value_parser = parse_evidence)]
    pub evidence: Vec<(String, String)>,
}

impl From<&PayArgs> for PayRequest {
    fn from(args: &PayArgs) -> Self {
        let mut request = PayRequest::new(args.counterparty.clone(), args.amount, args.currency.clone())
            .with_note(args.note.clone());
        if let Some(payer) = &args.payer {
            request = request.with_payer(payer.clone());
        }
        if let Some(run) = &args.settlement_run {
            request = request.with_settlement_run(run.clone());
        }
        request
    }
}

fn parse_evidence(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("evidence must be key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("evidence key must not be empty"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

pub fn run_pay(args: &PayArgs, ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let request = PayRequest::from(args);
    report(ctx.processor.pay(&request), out)
}

pub fn run_refund(args: &RefundArgs, ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let request = RefundRequest {
        payment: args.payment,
        amount: args.amount,
        currency: args.currency.clone(),
        reason: args.reason.clone(),
    };
    report(ctx.processor.refund(&request), out)
}

pub fn run_flag(args: &FlagArgs, ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let request = FraudRequest {
        target: args.target,
        reason: args.reason.clone(),
        evidence: args.evidence.iter().cloned().collect::<BTreeMap<_, _>>(),
    };
    report(ctx.processor.flag_fraud(&request), out)
}

/// Print the chain on success, or the classified error on rejection.
pub(crate) fn report(
    result: Result<ChainSummary, ProcessorError>,
    out: &mut dyn Write,
) -> Result<u8> {
    match result {
        Ok(summary) => {
            write_json(out, &summary)?;
            Ok(0)
        }
        Err(e) => {
            tracing::warn!(kind = %e.kind(), "operation rejected: {e}");
            write_json(
                out,
                &json!({ "error": { "kind": e.kind(), "message": e.to_string() } }),
            )?;
            Ok(EXIT_REJECTED)
        }
    }
}
