//! # Signing and Verification
//!
//! [`Signer`] turns a canonical mandate payload into a [`Proof`]. [`Verifier`]
//! decides whether a signed mandate's proof is genuine and issued by a
//! trusted party. The ledger only ever sees the verifier.
//!
//! [`KeyRing`] is the Ed25519 implementation: one key pair per issuer,
//! verification method `<issuer>#keys-1`, proof value the hex signature over
//! the mandate's credential form without its proof.

use std::collections::HashMap;

use ap2_core::{CanonicalBytes, IssuerId, Timestamp};
use ap2_crypto::{Ed25519KeyPair, Ed25519PublicKey};
use ap2_vc::{Proof, VcError};
use thiserror::Error;

use crate::mandate::Mandate;

/// Errors from signing.
#[derive(Error, Debug)]
pub enum SigningError {
    /// No key is held for the issuer.
    #[error("no signing key for issuer {issuer}")]
    UnknownIssuer {
        /// Issuer the mandate names.
        issuer: IssuerId,
    },

    /// The mandate could not be put in signing form, or is already signed.
    #[error(transparent)]
    Credential(#[from] VcError),
}

/// Checks proofs on signed mandates.
pub trait Verifier: Send + Sync {
    /// Whether the mandate carries a valid proof from its issuer.
    fn verify(&self, mandate: &Mandate) -> bool;
}

/// Produces proofs. Every signer can also check its own proofs.
pub trait Signer: Verifier {
    /// Sign `payload` on behalf of `issuer`.
    fn sign(
        &self,
        payload: &CanonicalBytes,
        issuer: &IssuerId,
        created: Timestamp,
    ) -> Result<Proof, SigningError>;
}

/// Sign a mandate in place.
///
/// The payload is the mandate's signing input; the proof is attached once.
pub fn sign_mandate(
    signer: &dyn Signer,
    mandate: &mut Mandate,
    created: Timestamp,
) -> Result<(), SigningError> {
    let payload = mandate.signing_input()?;
    let proof = signer.sign(&payload, mandate.issuer(), created)?;
    mandate.attach_proof(proof)?;
    Ok(())
}

/// Ed25519 keys, one per trusted issuer.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: HashMap<IssuerId, Ed25519KeyPair>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh random keys for each issuer. Proofs do not survive a restart.
    pub fn generate<'a>(issuers: impl IntoIterator<Item = &'a IssuerId>) -> Self {
        let keys = issuers
            .into_iter()
            .map(|issuer| (issuer.clone(), Ed25519KeyPair::generate()))
            .collect();
        Self { keys }
    }

    /// Deterministic keys derived from one secret, labelled by issuer.
    ///
    /// Two key rings built from the same secret verify each other's proofs.
    pub fn derived<'a>(secret: &[u8], issuers: impl IntoIterator<Item = &'a IssuerId>) -> Self {
        let keys = issuers
            .into_iter()
            .map(|issuer| (issuer.clone(), Ed25519KeyPair::derive(secret, issuer.as_str())))
            .collect();
        Self { keys }
    }

    /// Add or replace the key for `issuer`.
    pub fn insert(&mut self, issuer: IssuerId, key: Ed25519KeyPair) {
        self.keys.insert(issuer, key);
    }

    pub fn public_key(&self, issuer: &IssuerId) -> Option<Ed25519PublicKey> {
        self.keys.get(issuer).map(Ed25519KeyPair::public_key)
    }

    /// Resolve a verification method such as `issuer:merchant#keys-1`.
    pub fn resolve(&self, verification_method: &str) -> Result<Ed25519PublicKey, String> {
        let (controller, fragment) = verification_method
            .split_once('#')
            .ok_or_else(|| format!("verification method {verification_method:?} has no key fragment"))?;
        if fragment != ap2_vc::proof::KEY_FRAGMENT {
            return Err(format!("unknown key fragment {fragment:?}"));
        }
        self.keys
            .iter()
            .find(|(issuer, _)| issuer.as_str() == controller)
            .map(|(_, key)| key.public_key())
            .ok_or_else(|| format!("issuer {controller:?} is not trusted"))
    }
}

impl Verifier for KeyRing {
    fn verify(&self, mandate: &Mandate) -> bool {
        let result = mandate
            .to_credential()
            .and_then(|vc| vc.verify(|vm| self.resolve(vm)));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    vc_id = %mandate.vc_id(),
                    issuer = %mandate.issuer(),
                    error = %e,
                    "mandate proof rejected"
                );
                false
            }
        }
    }
}

impl Signer for KeyRing {
    fn sign(
        &self,
        payload: &CanonicalBytes,
        issuer: &IssuerId,
        created: Timestamp,
    ) -> Result<Proof, SigningError> {
        let key = self
            .keys
            .get(issuer)
            .ok_or_else(|| SigningError::UnknownIssuer { issuer: issuer.clone() })?;
        let signature = key.sign(payload);
        Ok(Proof::new_ed25519(
            Proof::verification_method_for(issuer),
            signature.to_hex(),
            created,
        ))
    }
}
