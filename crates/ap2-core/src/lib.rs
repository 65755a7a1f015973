//! # ap2-core — Foundational Types for the Mandate Ledger
//!
//! This crate is the leaf of the workspace dependency graph. It defines the
//! primitives every other crate builds on:
//!
//! 1. **Identifier newtypes.** `MandateId`, `VcId` and `TxnId` are distinct
//!    types over 128-bit UUIDs, so a mandate id can never be passed where a
//!    vc id is expected. `IssuerId` and `PartyId` are validated strings.
//!
//! 2. **`CanonicalBytes`.** All signing and digest input flows through
//!    `CanonicalBytes::new()` (RFC 8785 JCS, floats rejected).
//!
//! 3. **`Amount`.** Fixed-point signed decimal with four fractional digits,
//!    serialized as a decimal string. Monetary values never touch `f64`
//!    after the request boundary.
//!
//! 4. **UTC-only timestamps** and half-open [`ValidityWindow`]s.
//!
//! 5. **`IdentityProvider`.** The injected source of identifiers and time;
//!    there is no ambient global identifier state.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `ap2-*` crates.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod provider;
pub mod temporal;

pub use amount::{Amount, CurrencyCode};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, CryptoError, ValidationError};
pub use identity::{IssuerId, MandateId, PartyId, TxnId, VcId};
pub use provider::{IdentityProvider, SequentialIdentityProvider, SystemIdentityProvider};
pub use temporal::{Timestamp, ValidityWindow};
