//! # ap2 CLI entry point
//!
//! Parses command-line arguments, installs logging, builds the processor
//! context and dispatches to the subcommand handlers.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ap2_cli::context::Context;
use ap2_cli::inspect::{
    run_chain, run_chains, run_export, run_verify, ChainArgs, ExportArgs, VerifyArgs,
};
use ap2_cli::payment::{run_flag, run_pay, run_refund, FlagArgs, PayArgs, RefundArgs};

/// AP2 payment mandate processor.
///
/// Builds signed, linked mandate chains (Intent, Cart, Netting, Payment,
/// Refund, FraudFlag) and records them in an append-only ledger.
#[derive(Parser, Debug)]
#[command(name = "ap2", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger file; overrides `ledger_path` from the configuration.
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a payment chain and drive it to its Payment.
    Pay(PayArgs),

    /// Refund (part of) a Payment.
    Refund(RefundArgs),

    /// Raise a fraud flag against a mandate.
    Flag(FlagArgs),

    /// Show a chain, its state and its audit report.
    Chain(ChainArgs),

    /// List every chain in the ledger.
    Chains,

    /// Export a chain as schema-validated credentials.
    Export(ExportArgs),

    /// Verify an exported chain offline.
    Verify(VerifyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "ap2 CLI starting");

    let ctx = match Context::load(cli.config.as_deref(), cli.ledger.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = match &cli.command {
        Commands::Pay(args) => run_pay(args, &ctx, &mut out),
        Commands::Refund(args) => run_refund(args, &ctx, &mut out),
        Commands::Flag(args) => run_flag(args, &ctx, &mut out),
        Commands::Chain(args) => run_chain(args, &ctx, &mut out),
        Commands::Chains => run_chains(&ctx, &mut out),
        Commands::Export(args) => run_export(args, &ctx, &mut out),
        Commands::Verify(args) => run_verify(args, &ctx, &mut out),
    };
    let _ = out.flush();

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

/// Without `-v`, `RUST_LOG` decides; otherwise the repetition count does.
fn init_tracing(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
