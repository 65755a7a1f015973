//! # ap2-crypto — Signing Primitives
//!
//! - **Ed25519** signing and verification for mandate proofs. Input is
//!   always `&CanonicalBytes`.
//! - **Seed derivation** from a shared secret and an issuer label, so a
//!   ledger written by one process can be verified by the next.
//!
//! ## Crate Policy
//!
//! - Depends only on `ap2-core` internally.
//! - No mocking of cryptographic operations in tests.

pub mod ed25519;
pub mod sha256;

pub use ed25519::{verify, verify_with_public_key, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use sha256::{derive_seed, sha256_digest, sha256_hex};
