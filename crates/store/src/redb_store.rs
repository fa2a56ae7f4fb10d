//! The redb-backed [`LinkStore`] implementation.
//!
//! One primary table plus two secondary indexes, all maintained inside the
//! same write transaction. redb serializes write transactions, which is
//! what makes the conditional upsert atomic.

use crate::{ChangeEvent, LinkStore, StoreError, UpsertOutcome};
use async_trait::async_trait;
use link_types::record::{EditorPublicKey, InfoHash, LinkRecord};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// ---- Table definitions (single DB, prefix-encoded index keys) ----
/// Primary: editor public key -> bincode-encoded record.
const LINKS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("LINKS");
/// Index: [info_hash(32)][editor_key(32)] -> ().
const BY_HASH: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BY_HASH");
/// Index: [order_preserving_be64(expiration)][editor_key(32)] -> ().
const BY_EXPIRATION: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BY_EXPIRATION");

/// How many change events may queue per receiver before it lags.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Encodes a signed expiration so lexicographic key order equals numeric
/// order: flip the sign bit and store big-endian.
fn enc_expiration(expiration: i64) -> [u8; 8] {
    ((expiration as u64) ^ (1 << 63)).to_be_bytes()
}

fn k_by_hash(info_hash: &InfoHash, editor: &EditorPublicKey) -> Vec<u8> {
    [info_hash.0.as_slice(), editor.0.as_slice()].concat()
}

fn k_by_expiration(expiration: i64, editor: &EditorPublicKey) -> Vec<u8> {
    [enc_expiration(expiration).as_slice(), editor.0.as_slice()].concat()
}

fn encode_record(record: &LinkRecord) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(record).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode_record(bytes: &[u8]) -> Result<LinkRecord, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

/// A persistent link store on a single redb database file.
#[derive(Clone)]
pub struct RedbLinkStore {
    db: Arc<Database>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl RedbLinkStore {
    /// Opens (or creates) the database at `path` and ensures the tables
    /// exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;

        {
            let w = db
                .begin_write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            {
                w.open_table(LINKS)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                w.open_table(BY_HASH)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                w.open_table(BY_EXPIRATION)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
            w.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self {
            db: Arc::new(db),
            changes,
        })
    }

    fn publish(&self, event: ChangeEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl LinkStore for RedbLinkStore {
    async fn get(
        &self,
        editor_public_key: &EditorPublicKey,
    ) -> Result<Option<LinkRecord>, StoreError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = r
            .open_table(LINKS)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let result = match table
            .get(&editor_public_key.0)
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(guard) => Ok(Some(decode_record(guard.value())?)),
            None => Ok(None),
        };
        result
    }

    async fn upsert_if_monotonic(&self, record: LinkRecord) -> Result<UpsertOutcome, StoreError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let outcome = {
            let mut links = w
                .open_table(LINKS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut by_hash = w
                .open_table(BY_HASH)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut by_expiration = w
                .open_table(BY_EXPIRATION)
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            let existing = match links
                .get(&record.editor_public_key.0)
                .map_err(|e| StoreError::Backend(e.to_string()))?
            {
                Some(guard) => Some(decode_record(guard.value())?),
                None => None,
            };

            match existing {
                None => {
                    let encoded = encode_record(&record)?;
                    links
                        .insert(&record.editor_public_key.0, encoded.as_slice())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    by_hash
                        .insert(
                            k_by_hash(&record.info_hash, &record.editor_public_key).as_slice(),
                            b"".as_slice(),
                        )
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    by_expiration
                        .insert(
                            k_by_expiration(record.expiration, &record.editor_public_key)
                                .as_slice(),
                            b"".as_slice(),
                        )
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    UpsertOutcome::Inserted
                }
                Some(old)
                    if old.counter < record.counter && old.expiration <= record.expiration =>
                {
                    let encoded = encode_record(&record)?;
                    links
                        .insert(&record.editor_public_key.0, encoded.as_slice())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;

                    if old.info_hash != record.info_hash {
                        by_hash
                            .remove(k_by_hash(&old.info_hash, &old.editor_public_key).as_slice())
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                        by_hash
                            .insert(
                                k_by_hash(&record.info_hash, &record.editor_public_key).as_slice(),
                                b"".as_slice(),
                            )
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                    }
                    if old.expiration != record.expiration {
                        by_expiration
                            .remove(
                                k_by_expiration(old.expiration, &old.editor_public_key).as_slice(),
                            )
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                        by_expiration
                            .insert(
                                k_by_expiration(record.expiration, &record.editor_public_key)
                                    .as_slice(),
                                b"".as_slice(),
                            )
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                    }
                    UpsertOutcome::Replaced(old)
                }
                // Counter conflicts classify first, mirroring the admission
                // engine's error precedence.
                Some(old) if old.counter >= record.counter => UpsertOutcome::RejectedCounter(old),
                Some(old) => UpsertOutcome::RejectedExpiration(old),
            }
        };

        w.commit().map_err(|e| StoreError::Backend(e.to_string()))?;

        match &outcome {
            UpsertOutcome::Inserted => self.publish(ChangeEvent::Inserted {
                after: record.clone(),
            }),
            UpsertOutcome::Replaced(old) => self.publish(ChangeEvent::Replaced {
                before: old.clone(),
                after: record.clone(),
            }),
            UpsertOutcome::RejectedCounter(_) | UpsertOutcome::RejectedExpiration(_) => {}
        }

        Ok(outcome)
    }

    async fn find_by_info_hash_live(
        &self,
        info_hashes: &[InfoHash],
        now: i64,
    ) -> Result<Vec<LinkRecord>, StoreError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let by_hash = r
            .open_table(BY_HASH)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let links = r
            .open_table(LINKS)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Duplicate hashes in one request must not duplicate announcements.
        let unique: BTreeSet<&InfoHash> = info_hashes.iter().collect();

        let mut out = Vec::new();
        for info_hash in unique {
            let prefix = info_hash.0.as_slice();
            let editors: Vec<[u8; 32]> = by_hash
                .range(prefix..)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .take_while(|entry| {
                    entry
                        .as_ref()
                        .is_ok_and(|(k, _)| k.value().starts_with(prefix))
                })
                .map(|entry| {
                    entry.map(|(k, _)| {
                        let mut editor = [0u8; 32];
                        editor.copy_from_slice(&k.value()[32..64]);
                        editor
                    })
                })
                .collect::<Result<_, _>>()
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            for editor in editors {
                let record = match links
                    .get(&editor)
                    .map_err(|e| StoreError::Backend(e.to_string()))?
                {
                    Some(guard) => decode_record(guard.value())?,
                    None => continue,
                };
                if !record.is_expired(now) {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    async fn delete_expired(&self, now: i64) -> Result<usize, StoreError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut deleted = Vec::new();
        {
            let mut links = w
                .open_table(LINKS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut by_hash = w
                .open_table(BY_HASH)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut by_expiration = w
                .open_table(BY_EXPIRATION)
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            // Upper bound covers every editor key at expiration == now.
            let mut upper = enc_expiration(now).to_vec();
            upper.extend_from_slice(&[0xff; 32]);

            let expired_keys: Vec<Vec<u8>> = by_expiration
                .range(..=upper.as_slice())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|entry| entry.map(|(k, _)| k.value().to_vec()))
                .collect::<Result<_, _>>()
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            for key in expired_keys {
                let mut editor = [0u8; 32];
                editor.copy_from_slice(&key[8..40]);

                let record = match links
                    .get(&editor)
                    .map_err(|e| StoreError::Backend(e.to_string()))?
                {
                    Some(guard) => Some(decode_record(guard.value())?),
                    None => None,
                };

                by_expiration
                    .remove(key.as_slice())
                    .map_err(|e| StoreError::Backend(e.to_string()))?;

                if let Some(record) = record {
                    links
                        .remove(&editor)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    by_hash
                        .remove(k_by_hash(&record.info_hash, &record.editor_public_key).as_slice())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    deleted.push(record);
                }
            }
        }

        w.commit().map_err(|e| StoreError::Backend(e.to_string()))?;

        let count = deleted.len();
        for record in deleted {
            self.publish(ChangeEvent::Deleted { before: record });
        }
        Ok(count)
    }

    fn change_feed(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
