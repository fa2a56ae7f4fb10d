#![forbid(unsafe_code)]

//! Ed25519 verification for the link server.
//!
//! Two checks gate every admission:
//!
//! * the **editor signature** binds the whole container to the editor's
//!   public key (the URL path segment the container was submitted under);
//! * the **proof-of-knowledge** is a signature under the info-hash keypair
//!   over the editor's public key, demonstrating that whoever prepared the
//!   container knows the URI the info hash was derived from — or was
//!   delegated by someone who does.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use link_types::error::ErrorCode;
use link_types::record::{EditorPublicKey, InfoHash};
use rand::rngs::OsRng;
use thiserror::Error;

/// Errors produced by signature and proof-of-knowledge checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A key could not be parsed from its raw bytes.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The editor signature did not verify over the container bytes.
    #[error("invalid signature")]
    InvalidSignature,
    /// The proof-of-knowledge did not verify over the editor's public key.
    #[error("invalid proof of knowledge")]
    InvalidProofOfKnowledge,
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature => "CRYPTO_INVALID_SIGNATURE",
            Self::InvalidProofOfKnowledge => "CRYPTO_INVALID_POK",
        }
    }
}

/// Verifies the editor's signature over the container bytes.
///
/// `message` is the container excluding the trailing signature. A 32-byte
/// string that is not a valid curve point fails the same way a bad
/// signature does: the caller cannot distinguish the two, and must not.
pub fn verify_signature(
    editor_public_key: &EditorPublicKey,
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(&editor_public_key.0)
        .map_err(|_| CryptoError::InvalidSignature)?;
    key.verify(message, &Signature::from_bytes(signature))
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Verifies the proof-of-knowledge for an info hash.
///
/// The info hash is interpreted as an ed25519 public key; the proof is a
/// signature under the matching private key (the URI) over the editor's
/// public key bytes.
pub fn verify_pok(
    info_hash: &InfoHash,
    editor_public_key: &EditorPublicKey,
    pok: &[u8; 64],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(&info_hash.0)
        .map_err(|_| CryptoError::InvalidProofOfKnowledge)?;
    key.verify(&editor_public_key.0, &Signature::from_bytes(pok))
        .map_err(|_| CryptoError::InvalidProofOfKnowledge)
}

/// An ed25519 key pair for producing containers and proofs.
///
/// The server itself only verifies; this type exists for tests and client
/// tooling that need to mint editor keys and URIs.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Reconstructs a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The raw public key bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The public key viewed as an editor identity.
    pub fn editor_public_key(&self) -> EditorPublicKey {
        EditorPublicKey(self.public_bytes())
    }

    /// The public key viewed as a pub/sub topic.
    pub fn info_hash(&self) -> InfoHash {
        InfoHash(self.public_bytes())
    }

    /// Signs `message`, returning the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Signs an editor's public key with this pair's private key,
    /// producing the proof-of-knowledge for this pair's info hash.
    pub fn prove_knowledge(&self, editor_public_key: &EditorPublicKey) -> [u8; 64] {
        self.sign(&editor_public_key.0)
    }
}

#[cfg(test)]
mod tests;
