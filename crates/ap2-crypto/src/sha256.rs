//! # SHA-256 Helpers
//!
//! Content digests come from `ap2_core::sha256_digest` and accept only
//! `CanonicalBytes`. This module adds the one raw-bytes use of SHA-256 in
//! the workspace: deriving an Ed25519 seed from a secret and a label.

use sha2::{Digest, Sha256};

pub use ap2_core::sha256_digest;
use ap2_core::CanonicalBytes;

/// SHA-256 of canonical bytes as lowercase hex.
pub fn sha256_hex(data: &CanonicalBytes) -> String {
    sha256_digest(data).to_hex()
}

/// Derive a 32-byte Ed25519 seed as `SHA-256(secret || 0x00 || label)`.
///
/// The zero separator keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn derive_seed(secret: &[u8], label: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update([0u8]);
    hasher.update(label.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    seed
}
