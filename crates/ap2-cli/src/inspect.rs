//! # Inspection Subcommands
//!
//! Read-only views over the ledger: one chain with its audit report, a
//! list of chains, a credential export for auditors, and offline
//! verification of such an export.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use ap2_core::VcId;
use ap2_ledger::AuditReport;
use ap2_mandate::{ChainExport, ExportError};
use ap2_processor::ChainSummary;
use ap2_vc::MandateSchema;
use clap::Args;
use serde::Serialize;
use serde_json::json;

use crate::context::Context;
use crate::{write_json, EXIT_REJECTED};

/// Show a chain and its audit report.
#[derive(Args, Debug)]
pub struct ChainArgs {
    /// Any credential id in the chain.
    pub vc_id: VcId,
}

/// Export a chain as schema-conformant credentials.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Any credential id in the chain.
    pub vc_id: VcId,

    /// Write to this file instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Verify an exported chain.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Export file produced by `ap2 export`.
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
struct ChainView {
    #[serde(flatten)]
    summary: ChainSummary,
    audit: AuditReport,
}

#[derive(Debug, Serialize)]
struct RootView {
    root: VcId,
    state: String,
    steps: usize,
}

pub fn run_chain(args: &ChainArgs, ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let summary = match ctx.processor.summary(&args.vc_id) {
        Ok(summary) => summary,
        Err(e) => return crate::payment::report(Err(e), out),
    };
    let audit = ctx.processor.ledger().audit(&summary.root)?;
    if !audit.consistent {
        tracing::warn!(root = %summary.root, findings = audit.findings.len(), "chain is inconsistent");
    }
    write_json(out, &ChainView { summary, audit })?;
    Ok(0)
}

pub fn run_chains(ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let views = ctx
        .processor
        .ledger()
        .roots()
        .into_iter()
        .map(|root| -> Result<RootView> {
            let summary = ctx.processor.summary(&root)?;
            Ok(RootView {
                root,
                state: summary.state.to_string(),
                steps: summary.steps.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    write_json(out, &views)?;
    Ok(0)
}

pub fn run_export(args: &ExportArgs, ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let export = export_chain(ctx, &args.vc_id)?;
    export
        .validate(&MandateSchema::load()?)
        .context("exported chain does not conform to the mandate schema")?;
    match &args.out {
        Some(path) => {
            let json = serde_json::to_string_pretty(&export)?;
            fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
            tracing::info!(
                root = %export.root,
                credentials = export.credentials.len(),
                path = %path.display(),
                "chain exported"
            );
        }
        None => write_json(out, &export)?,
    }
    Ok(0)
}

pub fn run_verify(args: &VerifyArgs, ctx: &Context, out: &mut dyn Write) -> Result<u8> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let export: ChainExport = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a chain export", args.file.display()))?;

    let schema = MandateSchema::load()?;
    let result = export
        .validate(&schema)
        .and_then(|()| export.verify(|vm| ctx.keys.resolve(vm)));
    report_verification(&export, result, out)
}

fn export_chain(ctx: &Context, vc_id: &VcId) -> Result<ChainExport> {
    let ledger = ctx.processor.ledger();
    let root = ledger.chain_root(vc_id)?;
    let mandates = ledger
        .chain_entries(&root)?
        .into_iter()
        .map(|e| e.mandate)
        .collect::<Vec<_>>();
    Ok(ChainExport::build(&mandates, ledger.transactions_of(&root)?)?)
}

fn report_verification(
    export: &ChainExport,
    result: Result<(), ExportError>,
    out: &mut dyn Write,
) -> Result<u8> {
    match result {
        Ok(()) => {
            write_json(
                out,
                &json!({
                    "valid": true,
                    "root": export.root,
                    "credentials": export.credentials.len(),
                }),
            )?;
            Ok(0)
        }
        Err(e) => {
            tracing::warn!(root = %export.root, "export failed verification: {e}");
            write_json(out, &json!({ "valid": false, "root": export.root, "reason": e.to_string() }))?;
            Ok(EXIT_REJECTED)
        }
    }
}
