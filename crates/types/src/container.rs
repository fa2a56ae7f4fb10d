//! The container byte layout and its pack/unpack codec.
//!
//! A container is the unit clients sign and submit:
//!
//! ```text
//! [ version u8 | info_hash 32 B | pok 64 B | counter i64 BE | expiration i64 BE ]
//! [ payload 0..=256 B ]
//! [ signature 64 B ]
//! ```
//!
//! The server treats the payload as opaque; only the metadata prefix and the
//! trailing signature are interpreted. This module is the single source of
//! truth for the offsets.

use crate::error::ErrorCode;
use crate::record::InfoHash;
use thiserror::Error;

/// The only wire version this server speaks.
pub const CONTAINER_VERSION: u8 = 0;
/// Length of the fixed metadata prefix: version, info hash, proof of
/// knowledge, counter, expiration.
pub const METADATA_LEN: usize = 1 + 32 + 64 + 8 + 8;
/// Length of an ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;
/// The payload may not exceed this many bytes.
pub const PAYLOAD_MAX_LEN: usize = 256;
/// Smallest valid container: metadata prefix plus trailing signature.
pub const CONTAINER_MIN_LEN: usize = METADATA_LEN + SIGNATURE_LEN;
/// Largest valid container: minimum plus a full payload.
pub const CONTAINER_MAX_LEN: usize = CONTAINER_MIN_LEN + PAYLOAD_MAX_LEN;

/// Errors produced while unpacking a container.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerError {
    /// The blob is shorter than the metadata prefix plus signature.
    #[error("container is {got} bytes, below the {CONTAINER_MIN_LEN}-byte minimum")]
    TooShort {
        /// Observed length of the blob.
        got: usize,
    },
    /// The blob carries a payload beyond [`PAYLOAD_MAX_LEN`].
    #[error("container is {got} bytes, above the {CONTAINER_MAX_LEN}-byte maximum")]
    TooLong {
        /// Observed length of the blob.
        got: usize,
    },
}

impl ErrorCode for ContainerError {
    fn code(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "CONTAINER_TOO_SHORT",
            Self::TooLong { .. } => "CONTAINER_TOO_LONG",
        }
    }
}

/// The decoded fixed-size metadata prefix of a container.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContainerMeta {
    /// Wire version; must equal [`CONTAINER_VERSION`].
    pub version: u8,
    /// The topic the container is announced under, an ed25519 public key.
    pub info_hash: InfoHash,
    /// Proof-of-knowledge: a signature under the info-hash keypair over the
    /// editor's public key.
    pub pok: [u8; 64],
    /// Replacement counter.
    pub counter: i64,
    /// Expiration in seconds since the Unix epoch.
    pub expiration: i64,
}

impl std::fmt::Debug for ContainerMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerMeta")
            .field("version", &self.version)
            .field("info_hash", &self.info_hash)
            .field("counter", &self.counter)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// A container unpacked into its parts, borrowing from the raw blob.
#[derive(Debug, Clone, Copy)]
pub struct Container<'a> {
    /// The decoded metadata prefix.
    pub meta: ContainerMeta,
    /// The opaque client payload between the prefix and the signature.
    pub payload: &'a [u8],
    /// The trailing ed25519 signature under the editor's key.
    pub signature: [u8; 64],
    /// Everything the signature covers: the container minus the signature.
    pub signed: &'a [u8],
}

fn take_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Splits a raw signed container into metadata, payload and signature.
///
/// Only the length constraints are enforced here; version and signature
/// checks belong to the admission engine.
pub fn unpack(container_signed: &[u8]) -> Result<Container<'_>, ContainerError> {
    let got = container_signed.len();
    if got < CONTAINER_MIN_LEN {
        return Err(ContainerError::TooShort { got });
    }
    if got > CONTAINER_MAX_LEN {
        return Err(ContainerError::TooLong { got });
    }

    let (signed, signature) = container_signed.split_at(got - SIGNATURE_LEN);

    let version = signed[0];
    let info_hash = InfoHash(take_array::<32>(&signed[1..33]));
    let pok = take_array::<64>(&signed[33..97]);
    let counter = i64::from_be_bytes(take_array::<8>(&signed[97..105]));
    let expiration = i64::from_be_bytes(take_array::<8>(&signed[105..METADATA_LEN]));

    Ok(Container {
        meta: ContainerMeta {
            version,
            info_hash,
            pok,
            counter,
            expiration,
        },
        payload: &signed[METADATA_LEN..],
        signature: take_array::<64>(signature),
        signed,
    })
}

/// Builds the unsigned container bytes for `meta` and `payload`.
///
/// The result is what the editor signs; appending that 64-byte signature
/// yields a complete container. Inverse of [`unpack`] up to the signature.
pub fn pack(meta: &ContainerMeta, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(METADATA_LEN + payload.len());
    out.push(meta.version);
    out.extend_from_slice(&meta.info_hash.0);
    out.extend_from_slice(&meta.pok);
    out.extend_from_slice(&meta.counter.to_be_bytes());
    out.extend_from_slice(&meta.expiration.to_be_bytes());
    out.extend_from_slice(payload);
    out
}
