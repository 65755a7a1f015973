//! # Append Log
//!
//! The only persistence boundary. The ledger appends one [`LedgerEntry`] per
//! commit, under its write lock, and replays the whole log when opened.
//! Entries are never rewritten or removed.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use ap2_core::Timestamp;
use ap2_mandate::{Mandate, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// One committed mandate and the transaction it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerEntry {
    /// Position in the ledger, starting at 1.
    pub seq: u64,
    pub committed_at: Timestamp,
    pub mandate: Mandate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

/// Append-only storage for ledger entries.
pub trait AppendLog: Send + Sync {
    /// Durably record `entry`. On error nothing may have been recorded.
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LogError>;

    /// Every recorded entry, oldest first.
    fn replay(&self) -> Result<Vec<LedgerEntry>, LogError>;
}

// ---- In-memory ----

/// Entries held in process. Nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    entries: Vec<LedgerEntry>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log pre-seeded with entries, e.g. the contents of another log.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}

impl AppendLog for MemoryLog {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LogError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn replay(&self) -> Result<Vec<LedgerEntry>, LogError> {
        Ok(self.entries.clone())
    }
}

// ---- JSON lines ----

/// One JSON object per line. Each append is flushed and synced before it
/// returns; a failed append truncates the file back to its previous length.
#[derive(Debug)]
pub struct JsonlLog {
    path: PathBuf,
    file: File,
}

impl JsonlLog {
    /// Open `path` for appending, creating it and its parent directory if
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let io = |source| LogError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn append_line<W>(&mut self, line: &[u8], write: W) -> Result<(), LogError>
    where
        W: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let len = self.file.metadata().map_err(|e| self.io_error(e))?.len();
        let written = write(&mut self.file, line)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_all());
        if let Err(source) = written {
            if let Err(error) = self.file.set_len(len) {
                tracing::error!(
                    path = %self.path.display(),
                    len,
                    %error,
                    "failed to truncate ledger log after a failed append"
                );
            }
            return Err(self.io_error(source));
        }
        Ok(())
    }
}

impl AppendLog for JsonlLog {
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(entry).map_err(|source| LogError::Encode {
            seq: entry.seq,
            source,
        })?;
        line.push(b'\n');
        self.append_line(&line, |file, line| file.write_all(line))
    }

    fn replay(&self) -> Result<Vec<LedgerEntry>, LogError> {
        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(&line).map_err(|source| LogError::Decode {
                line: idx + 1,
                source,
            })?;
            let expected = entries.len() as u64 + 1;
            if entry.seq != expected {
                return Err(LogError::OutOfOrder {
                    expected,
                    found: entry.seq,
                });
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap2_core::{CurrencyCode, PartyId, SequentialIdentityProvider};
    use ap2_mandate::{IntentSubject, IssuerDirectory, MandateFactory, MandateSubject};
    use std::sync::Arc;

    fn entry(seq: u64) -> LedgerEntry {
        let start = Timestamp::parse("2026-03-01T10:00:00Z").unwrap();
        let factory = MandateFactory::new(
            Arc::new(SequentialIdentityProvider::new(start)),
            IssuerDirectory::default(),
            3600,
        );
        let mandate = factory
            .build(
                vec![],
                MandateSubject::Intent(IntentSubject {
                    payer: PartyId::new("payer-001").unwrap(),
                    counterparty: PartyId::new("Footlocker").unwrap(),
                    amount: "500".parse().unwrap(),
                    currency: CurrencyCode::new("GBP").unwrap(),
                    note: String::new(),
                    settlement_run: None,
                }),
            )
            .unwrap();
        LedgerEntry {
            seq,
            committed_at: start,
            mandate,
            transaction: None,
        }
    }

    #[test]
    fn memory_log_replays_in_order() {
        let mut log = MemoryLog::new();
        log.append(&entry(1)).unwrap();
        log.append(&entry(2)).unwrap();
        let replayed = log.replay().unwrap();
        assert_eq!(replayed.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn jsonl_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");
        let first = entry(1);
        {
            let mut log = JsonlLog::open(&path).unwrap();
            log.append(&first).unwrap();
        }
        let log = JsonlLog::open(&path).unwrap();
        assert_eq!(log.replay().unwrap(), vec![first]);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[test]
    fn failed_append_leaves_no_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let first = entry(1);
        let mut log = JsonlLog::open(&path).unwrap();
        log.append(&first).unwrap();
        let before = std::fs::metadata(&path).unwrap().len();

        let line = serde_json::to_vec(&entry(2)).unwrap();
        let err = log
            .append_line(&line, |file, line| {
                file.write_all(&line[..line.len() / 2])?;
                Err(io::Error::other("disk full"))
            })
            .unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
        assert_eq!(log.replay().unwrap(), vec![first]);

        log.append(&entry(2)).unwrap();
        assert_eq!(log.replay().unwrap().len(), 2);
    }

    #[test]
    fn jsonl_log_reports_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut log = JsonlLog::open(&path).unwrap();
        log.append(&entry(1)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();
        assert!(matches!(log.replay(), Err(LogError::Decode { line: 2, .. })));
    }

    #[test]
    fn jsonl_log_rejects_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = JsonlLog::open(dir.path().join("ledger.jsonl")).unwrap();
        log.append(&entry(1)).unwrap();
        log.append(&entry(3)).unwrap();
        assert!(matches!(
            log.replay(),
            Err(LogError::OutOfOrder { expected: 2, found: 3 })
        ));
    }
}
