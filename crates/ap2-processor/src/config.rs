//! # Processor Configuration
//!
//! Loaded from YAML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```yaml
//! mandate_ttl_secs: 3600
//! payer: payer-001
//! immediate_runs: [MISC, ADD1]
//! issuers:
//!   user_wallet: issuer:user-wallet
//!   merchant: issuer:merchant
//!   netting: issuer:netting
//!   processor: issuer:processor
//! ledger_path: ./ledger.jsonl
//! key_secret: change-me
//! ```

use std::path::{Path, PathBuf};

use ap2_core::PartyId;
use ap2_mandate::IssuerDirectory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settlement runs that settle without a netting step.
pub const DEFAULT_IMMEDIATE_RUNS: [&str; 2] = ["MISC", "ADD1"];

/// Errors from loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings for a [`crate::PaymentProcessor`] and the CLI around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Lifetime of every minted mandate.
    pub mandate_ttl_secs: u64,
    /// Issuer identity per role.
    pub issuers: IssuerDirectory,
    pub immediate_runs: Vec<String>,
    /// Payer used when a request names none.
    pub payer: PartyId,
    /// JSON-lines ledger file. In-memory when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
    /// Secret the issuer keys are derived from. Keys are random per run
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_secret: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            mandate_ttl_secs: 3600,
            issuers: IssuerDirectory::default(),
            immediate_runs: DEFAULT_IMMEDIATE_RUNS.iter().map(|r| r.to_string()).collect(),
            payer: PartyId::from_static("payer-001"),
            ledger_path: None,
            key_secret: None,
        }
    }
}

impl ProcessorConfig {
    /// Read and validate a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded processor config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mandate_ttl_secs == 0 {
            return Err(ConfigError::Invalid("mandate_ttl_secs must be positive".to_string()));
        }
        if self.immediate_runs.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::Invalid("immediate_runs entries must not be blank".to_string()));
        }
        if self.key_secret.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid("key_secret must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether a payment batched into `run` skips netting. No run at all
    /// also skips it.
    pub fn settles_immediately(&self, run: Option<&str>) -> bool {
        match run {
            None => true,
            Some(run) => self.immediate_runs.iter().any(|r| r == run),
        }
    }
}
