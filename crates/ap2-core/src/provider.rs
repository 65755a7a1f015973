//! # Identity Provider
//!
//! Every mandate id, vc id, transaction id and timestamp the processor mints
//! comes from an injected [`IdentityProvider`]. There is no process-global
//! identifier state, so tests can substitute a deterministic provider and
//! replay exactly the same ledger.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use uuid::Uuid;

use crate::error::ValidationError;
use crate::identity::{MandateId, TxnId, VcId};
use crate::temporal::{Timestamp, ValidityWindow};

/// Source of fresh identifiers and of the current time.
pub trait IdentityProvider: Send + Sync {
    /// A fresh mandate identifier.
    fn mandate_id(&self) -> MandateId;

    /// A fresh credential identifier.
    fn vc_id(&self) -> VcId;

    /// A fresh transaction identifier.
    fn txn_id(&self) -> TxnId;

    /// The current instant.
    fn now(&self) -> Timestamp;

    /// A validity window of `ttl_secs` starting now.
    fn window(&self, ttl_secs: u64) -> Result<ValidityWindow, ValidationError> {
        ValidityWindow::starting_at(self.now(), ttl_secs)
    }
}

/// Random v4 UUIDs and the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentityProvider;

impl IdentityProvider for SystemIdentityProvider {
    fn mandate_id(&self) -> MandateId {
        MandateId::new()
    }

    fn vc_id(&self) -> VcId {
        VcId::new()
    }

    fn txn_id(&self) -> TxnId {
        TxnId::new()
    }

    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Deterministic provider: identifiers count up from 1 and the clock only
/// moves when told to.
///
/// All three identifier kinds draw from one counter, so no two identifiers
/// minted by the same provider share a UUID.
#[derive(Debug)]
pub struct SequentialIdentityProvider {
    counter: AtomicU64,
    clock: AtomicI64,
}

impl SequentialIdentityProvider {
    /// Start with the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            counter: AtomicU64::new(0),
            clock: AtomicI64::new(start.epoch_secs()),
        }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.clock.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the clock.
    pub fn set_now(&self, at: Timestamp) {
        self.clock.store(at.epoch_secs(), Ordering::SeqCst);
    }

    fn next_uuid(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(u128::from(n))
    }
}

impl IdentityProvider for SequentialIdentityProvider {
    fn mandate_id(&self) -> MandateId {
        MandateId::from_uuid(self.next_uuid())
    }

    fn vc_id(&self) -> VcId {
        VcId::from_uuid(self.next_uuid())
    }

    fn txn_id(&self) -> TxnId {
        TxnId::from_uuid(self.next_uuid())
    }

    fn now(&self) -> Timestamp {
        let secs = self.clock.load(Ordering::SeqCst);
        Timestamp::from_epoch_secs(secs).unwrap_or_else(|_| Timestamp::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> Timestamp {
        Timestamp::parse("2026-03-01T10:00:00Z").unwrap()
    }

    #[test]
    fn sequential_ids_are_distinct_across_kinds() {
        let p = SequentialIdentityProvider::new(start());
        let m = p.mandate_id();
        let v = p.vc_id();
        let t = p.txn_id();
        assert_eq!(m.as_uuid().as_u128(), 1);
        assert_eq!(v.as_uuid().as_u128(), 2);
        assert_eq!(t.as_uuid().as_u128(), 3);
    }

    #[test]
    fn sequential_clock_moves_only_on_request() {
        let p = SequentialIdentityProvider::new(start());
        assert_eq!(p.now(), start());
        p.advance(3600);
        assert_eq!(p.now().to_iso8601(), "2026-03-01T11:00:00Z");
        p.set_now(start());
        assert_eq!(p.now(), start());
    }

    #[test]
    fn window_starts_now() {
        let p = SequentialIdentityProvider::new(start());
        let w = p.window(3600).unwrap();
        assert_eq!(w.issuance(), start());
        assert_eq!(w.expiration().to_iso8601(), "2026-03-01T11:00:00Z");
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let p = SequentialIdentityProvider::new(start());
        assert!(p.window(0).is_err());
    }

    #[test]
    fn system_provider_mints_unique_ids() {
        let p = SystemIdentityProvider;
        assert_ne!(p.vc_id(), p.vc_id());
        assert_ne!(p.txn_id(), p.txn_id());
    }
}
