#![forbid(unsafe_code)]

//! Persistent link storage for the link server.
//!
//! The [`LinkStore`] trait is the stable contract between the admission
//! engine, the pub/sub fabric and the storage backend: an indexed map from
//! editor public key to [`LinkRecord`] with a conditional, atomic upsert and
//! a typed change feed. [`RedbLinkStore`] implements it on `redb`.

use async_trait::async_trait;
use link_types::error::ErrorCode;
use link_types::record::{EditorPublicKey, InfoHash, LinkRecord};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::broadcast;

mod redb_store;
/// The background task that deletes expired links on an interval.
pub mod sweeper;

pub use redb_store::RedbLinkStore;
pub use sweeper::{run_expiration_sweeper, EXPIRATION_INTERVAL};

#[cfg(test)]
mod tests;

/// Represents errors that can occur within the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A generic error originating from the underlying key-value store
    /// backend (e.g., redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing a record for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing a record from storage.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Encode(_) => "STORE_ENCODE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
        }
    }
}

/// The result of a conditional upsert.
///
/// Rejections carry the record that remained persisted so the caller can
/// classify the conflict without a second read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for the editor key; the new record was inserted.
    Inserted,
    /// The monotonicity predicate held; carries the replaced record.
    Replaced(LinkRecord),
    /// The new counter did not strictly exceed the persisted counter.
    RejectedCounter(LinkRecord),
    /// The new expiration was earlier than the persisted expiration.
    RejectedExpiration(LinkRecord),
}

/// One mutation observed by the change feed.
///
/// Events are published after the owning transaction commits, so a consumer
/// never observes a state that was rolled back.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A record was created where none existed.
    Inserted {
        /// The newly persisted record.
        after: LinkRecord,
    },
    /// A record was replaced under the monotonicity predicate.
    Replaced {
        /// The record as it was before the replacement.
        before: LinkRecord,
        /// The record as persisted now.
        after: LinkRecord,
    },
    /// A record was deleted (by the expiration sweeper).
    Deleted {
        /// The record as it was before deletion.
        before: LinkRecord,
    },
}

impl ChangeEvent {
    /// The pre-image, when the event has one.
    pub fn before(&self) -> Option<&LinkRecord> {
        match self {
            Self::Inserted { .. } => None,
            Self::Replaced { before, .. } | Self::Deleted { before } => Some(before),
        }
    }

    /// The post-image, when the event has one.
    pub fn after(&self) -> Option<&LinkRecord> {
        match self {
            Self::Inserted { after } | Self::Replaced { after, .. } => Some(after),
            Self::Deleted { .. } => None,
        }
    }
}

/// The storage contract for link records.
///
/// Implementations must serialize concurrent upserts for the same editor
/// key: the committed state is either the incoming record (the predicate
/// held against whatever was persisted at commit time) or the existing one.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Fetches the record for an editor key. Expired records are still
    /// returned; only backlog reads filter by expiration.
    async fn get(&self, editor_public_key: &EditorPublicKey)
        -> Result<Option<LinkRecord>, StoreError>;

    /// Inserts `record`, or replaces the existing record iff
    /// `existing.counter < record.counter && existing.expiration <= record.expiration`.
    /// Rejections leave the persisted record untouched.
    async fn upsert_if_monotonic(&self, record: LinkRecord) -> Result<UpsertOutcome, StoreError>;

    /// Fetches every unexpired record whose info hash appears in `info_hashes`.
    /// Used to seed a new subscription with the current backlog.
    async fn find_by_info_hash_live(
        &self,
        info_hashes: &[InfoHash],
        now: i64,
    ) -> Result<Vec<LinkRecord>, StoreError>;

    /// Deletes every record with `expiration <= now`, emitting one
    /// [`ChangeEvent::Deleted`] per record. Returns the number deleted.
    async fn delete_expired(&self, now: i64) -> Result<usize, StoreError>;

    /// Subscribes to the typed change feed. Receivers that fall behind see
    /// a lag error and miss events; the backlog scan is the recovery path.
    fn change_feed(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
