//! The persisted link record and the 32-byte identifiers it is keyed by.

use serde::{Deserialize, Serialize};

/// An ed25519 public key identifying the author of a container.
///
/// This is the primary key of the store: at most one link record exists per
/// editor key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditorPublicKey(
    /// Raw 32-byte ed25519 public key.
    pub [u8; 32],
);

impl std::fmt::Debug for EditorPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EditorPublicKey({})", hex::encode(self.0))
    }
}

/// The addressable pub/sub topic of a link, itself an ed25519 public key.
///
/// Knowledge of the corresponding private key (the URI) authorizes posting
/// to this topic via the proof-of-knowledge.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InfoHash(
    /// Raw 32-byte ed25519 public key derived from the URI.
    pub [u8; 32],
);

impl std::fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InfoHash({})", hex::encode(self.0))
    }
}

/// One persisted link, keyed by `editor_public_key`.
///
/// `counter` is strictly monotonic under replacement and `expiration` is
/// monotonic non-decreasing; both were verified against the signed container
/// at admission time. `container_signed` holds the full raw container
/// including the trailing signature, returned verbatim on reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Primary key: the editor's ed25519 public key.
    pub editor_public_key: EditorPublicKey,
    /// Secondary index: the topic this link is announced under.
    pub info_hash: InfoHash,
    /// Replacement counter; a replacement must strictly increase it.
    pub counter: i64,
    /// Expiration in seconds since the Unix epoch; indexed for sweeping.
    pub expiration: i64,
    /// The full raw container, including the trailing signature.
    pub container_signed: Vec<u8>,
}

impl LinkRecord {
    /// Assembles a record from an unpacked container and the raw bytes it
    /// was unpacked from.
    pub fn from_container(
        editor_public_key: EditorPublicKey,
        container: &crate::container::Container<'_>,
        container_signed: &[u8],
    ) -> Self {
        Self {
            editor_public_key,
            info_hash: container.meta.info_hash,
            counter: container.meta.counter,
            expiration: container.meta.expiration,
            container_signed: container_signed.to_vec(),
        }
    }

    /// Whether this record is expired relative to `now` (seconds since epoch).
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration <= now
    }
}
