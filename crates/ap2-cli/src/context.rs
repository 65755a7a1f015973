//! # Command Context
//!
//! Builds the processor every subcommand runs against from the config file
//! and command-line overrides.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use ap2_core::{IdentityProvider, SystemIdentityProvider};
use ap2_ledger::{JsonlLog, Ledger};
use ap2_mandate::{KeyRing, Verifier};
use ap2_processor::{PaymentProcessor, ProcessorConfig};

/// Everything a subcommand needs.
#[derive(Debug)]
pub struct Context {
    pub processor: PaymentProcessor,
    pub keys: Arc<KeyRing>,
}

impl Context {
    /// Load the config at `config_path` (defaults when absent) and apply
    /// the `ledger` override.
    pub fn load(config_path: Option<&Path>, ledger: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => ProcessorConfig::load(path)?,
            None => ProcessorConfig::default(),
        };
        if let Some(ledger) = ledger {
            config.ledger_path = Some(ledger.to_path_buf());
        }
        Self::from_config(config)
    }

    pub fn from_config(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let issuers = config.issuers.all();
        let keys = match (&config.key_secret, &config.ledger_path) {
            (Some(secret), _) => KeyRing::derived(secret.as_bytes(), &issuers),
            (None, None) => {
                tracing::debug!("no key secret configured; using per-run keys");
                KeyRing::generate(&issuers)
            }
            (None, Some(path)) => bail!(
                "key_secret is required with a persistent ledger ({})",
                path.display()
            ),
        };
        let keys = Arc::new(keys);
        let verifier: Arc<dyn Verifier> = keys.clone();
        let ids: Arc<dyn IdentityProvider> = Arc::new(SystemIdentityProvider);

        let ledger = match &config.ledger_path {
            Some(path) => {
                let log = JsonlLog::open(path)
                    .with_context(|| format!("cannot open ledger {}", path.display()))?;
                Ledger::open(Box::new(log), config.issuers.clone(), ids.clone(), Some(verifier))
                    .with_context(|| format!("cannot replay ledger {}", path.display()))?
            }
            None => Ledger::in_memory(config.issuers.clone(), ids.clone(), Some(verifier)),
        };
        tracing::debug!(entries = ledger.len(), "ledger ready");

        let processor = PaymentProcessor::new(config, Arc::new(ledger), keys.clone(), ids);
        Ok(Self { processor, keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_ledger_needs_secret() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessorConfig {
            ledger_path: Some(dir.path().join("ledger.jsonl")),
            ..ProcessorConfig::default()
        };
        let err = Context::from_config(config).unwrap_err();
        assert!(err.to_string().contains("key_secret"));
    }

    #[test]
    fn ledger_override_applies() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("ap2.yaml");
        std::fs::write(&config_path, "key_secret: test-secret\n").unwrap();
        let ledger = dir.path().join("ledger.jsonl");
        let ctx = Context::load(Some(&config_path), Some(&ledger)).unwrap();
        assert_eq!(ctx.processor.config().ledger_path.as_deref(), Some(ledger.as_path()));
        assert!(ledger.exists());
    }
}
