//! # ap2-cli — Command Line for AP2 Mandate Chains
//!
//! ## Subcommands
//!
//! - `ap2 pay`: start a chain and drive it to its Payment.
//! - `ap2 refund`: refund (part of) a Payment.
//! - `ap2 flag`: raise a fraud flag against any mandate.
//! - `ap2 chain`: show a chain, its state and its audit report.
//! - `ap2 chains`: list every chain with its state.
//! - `ap2 export`: export a chain as schema-validated credentials.
//! - `ap2 verify`: check an exported chain's schema, proofs and links.
//!
//! Arguments are structured; nothing is parsed from free text. Results are
//! JSON on stdout, logs go to stderr.
//!
//! ```bash
//! # ap2.yaml sets key_secret and ledger_path
//! ap2 --config ap2.yaml pay --to Footlocker --amount 500 --currency GBP
//! ap2 --config ap2.yaml refund urn:uuid:… --amount 500 --currency GBP \
//!     --reason "Accidental Transaction"
//! ```

pub mod context;
pub mod inspect;
pub mod payment;

use std::io::Write;

use anyhow::{Context as _, Result};
use serde::Serialize;

/// Exit code for an operation the processor or verifier refused.
pub const EXIT_REJECTED: u8 = 2;

/// Write `value` as pretty JSON followed by a newline.
pub fn write_json(out: &mut dyn Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to encode output")?;
    writeln!(out).context("failed to write output")?;
    Ok(())
}
