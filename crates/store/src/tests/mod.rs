use super::*;
use crate::redb_store::RedbLinkStore;
use link_types::record::{EditorPublicKey, InfoHash, LinkRecord};
use tempfile::TempDir;

fn open_store() -> (TempDir, RedbLinkStore) {
    let dir = TempDir::new().unwrap();
    let store = RedbLinkStore::open(dir.path().join("links.redb")).unwrap();
    (dir, store)
}

fn record(editor: u8, hash: u8, counter: i64, expiration: i64) -> LinkRecord {
    LinkRecord {
        editor_public_key: EditorPublicKey([editor; 32]),
        info_hash: InfoHash([hash; 32]),
        counter,
        expiration,
        container_signed: vec![editor, hash, counter as u8, 0xee],
    }
}

#[tokio::test]
async fn get_missing_returns_none() {
    let (_dir, store) = open_store();
    assert_eq!(store.get(&EditorPublicKey([1; 32])).await.unwrap(), None);
}

#[tokio::test]
async fn insert_then_get_roundtrips() {
    let (_dir, store) = open_store();
    let rec = record(1, 2, 0, 100);

    assert_eq!(
        store.upsert_if_monotonic(rec.clone()).await.unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(store.get(&rec.editor_public_key).await.unwrap(), Some(rec));
}

#[tokio::test]
async fn replacement_requires_strictly_larger_counter() {
    let (_dir, store) = open_store();
    let first = record(1, 2, 5, 100);
    store.upsert_if_monotonic(first.clone()).await.unwrap();

    // Equal counter rejects.
    let equal = record(1, 2, 5, 100);
    assert_eq!(
        store.upsert_if_monotonic(equal).await.unwrap(),
        UpsertOutcome::RejectedCounter(first.clone())
    );

    // Smaller counter rejects.
    let smaller = record(1, 2, 4, 100);
    assert_eq!(
        store.upsert_if_monotonic(smaller).await.unwrap(),
        UpsertOutcome::RejectedCounter(first.clone())
    );

    // The persisted record is untouched.
    assert_eq!(
        store.get(&first.editor_public_key).await.unwrap(),
        Some(first.clone())
    );

    // Larger counter with equal expiration replaces.
    let larger = record(1, 2, 6, 100);
    assert_eq!(
        store.upsert_if_monotonic(larger.clone()).await.unwrap(),
        UpsertOutcome::Replaced(first)
    );
    assert_eq!(
        store.get(&larger.editor_public_key).await.unwrap(),
        Some(larger)
    );
}

#[tokio::test]
async fn replacement_rejects_decreasing_expiration() {
    let (_dir, store) = open_store();
    let first = record(1, 2, 0, 100);
    store.upsert_if_monotonic(first.clone()).await.unwrap();

    let earlier = record(1, 2, 1, 50);
    assert_eq!(
        store.upsert_if_monotonic(earlier).await.unwrap(),
        UpsertOutcome::RejectedExpiration(first.clone())
    );
    assert_eq!(
        store.get(&first.editor_public_key).await.unwrap(),
        Some(first)
    );
}

#[tokio::test]
async fn counter_conflict_classifies_before_expiration_conflict() {
    let (_dir, store) = open_store();
    let first = record(1, 2, 5, 100);
    store.upsert_if_monotonic(first.clone()).await.unwrap();

    // Both conditions fail; the counter conflict wins.
    let both_bad = record(1, 2, 5, 50);
    assert_eq!(
        store.upsert_if_monotonic(both_bad).await.unwrap(),
        UpsertOutcome::RejectedCounter(first)
    );
}

#[tokio::test]
async fn change_feed_carries_typed_images() {
    let (_dir, store) = open_store();
    let mut feed = store.change_feed();

    let first = record(1, 2, 0, 100);
    store.upsert_if_monotonic(first.clone()).await.unwrap();
    match feed.recv().await.unwrap() {
        ChangeEvent::Inserted { after } => assert_eq!(after, first),
        other => panic!("expected Inserted, got {other:?}"),
    }

    let second = record(1, 3, 1, 100);
    store.upsert_if_monotonic(second.clone()).await.unwrap();
    match feed.recv().await.unwrap() {
        ChangeEvent::Replaced { before, after } => {
            assert_eq!(before, first);
            assert_eq!(after, second);
        }
        other => panic!("expected Replaced, got {other:?}"),
    }

    // Rejections are silent.
    store.upsert_if_monotonic(record(1, 3, 0, 100)).await.unwrap();

    store.delete_expired(1_000).await.unwrap();
    match feed.recv().await.unwrap() {
        ChangeEvent::Deleted { before } => assert_eq!(before, second),
        other => panic!("expected Deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn backlog_reads_filter_expired_and_dedupe() {
    let (_dir, store) = open_store();
    let now = 1_000;

    let live = record(1, 7, 0, now + 100);
    let expired = record(2, 7, 0, now);
    let other_topic = record(3, 8, 0, now + 100);
    for rec in [&live, &expired, &other_topic] {
        store.upsert_if_monotonic(rec.clone()).await.unwrap();
    }

    // Duplicate hashes in the query must not duplicate results.
    let hashes = [InfoHash([7; 32]), InfoHash([7; 32])];
    let found = store.find_by_info_hash_live(&hashes, now).await.unwrap();
    assert_eq!(found, vec![live.clone()]);

    // Both topics at once.
    let hashes = [InfoHash([7; 32]), InfoHash([8; 32])];
    let mut found = store.find_by_info_hash_live(&hashes, now).await.unwrap();
    found.sort_by_key(|r| r.editor_public_key.0[0]);
    assert_eq!(found, vec![live, other_topic]);
}

#[tokio::test]
async fn info_hash_change_moves_the_index_entry() {
    let (_dir, store) = open_store();
    let now = 1_000;

    let first = record(1, 7, 0, now + 100);
    store.upsert_if_monotonic(first).await.unwrap();
    let moved = record(1, 8, 1, now + 100);
    store.upsert_if_monotonic(moved.clone()).await.unwrap();

    let old_topic = store
        .find_by_info_hash_live(&[InfoHash([7; 32])], now)
        .await
        .unwrap();
    assert!(old_topic.is_empty());

    let new_topic = store
        .find_by_info_hash_live(&[InfoHash([8; 32])], now)
        .await
        .unwrap();
    assert_eq!(new_topic, vec![moved]);
}

#[tokio::test]
async fn delete_expired_removes_only_past_records() {
    let (_dir, store) = open_store();
    let now = 1_000;

    let past = record(1, 7, 0, now - 1);
    let boundary = record(2, 7, 0, now);
    let future = record(3, 7, 0, now + 1);
    for rec in [&past, &boundary, &future] {
        store.upsert_if_monotonic(rec.clone()).await.unwrap();
    }

    // expiration <= now is expired, strictly greater survives.
    assert_eq!(store.delete_expired(now).await.unwrap(), 2);
    assert_eq!(store.get(&past.editor_public_key).await.unwrap(), None);
    assert_eq!(store.get(&boundary.editor_public_key).await.unwrap(), None);
    assert_eq!(
        store.get(&future.editor_public_key).await.unwrap(),
        Some(future.clone())
    );

    // The index was cleaned up with the records.
    let found = store
        .find_by_info_hash_live(&[InfoHash([7; 32])], now)
        .await
        .unwrap();
    assert_eq!(found, vec![future]);

    // A second sweep finds nothing.
    assert_eq!(store.delete_expired(now).await.unwrap(), 0);
}

#[tokio::test]
async fn negative_expirations_sort_before_positive_ones() {
    let (_dir, store) = open_store();

    let negative = record(1, 7, 0, -5);
    let positive = record(2, 7, 0, 5);
    for rec in [&negative, &positive] {
        store.upsert_if_monotonic(rec.clone()).await.unwrap();
    }

    assert_eq!(store.delete_expired(0).await.unwrap(), 1);
    assert_eq!(store.get(&negative.editor_public_key).await.unwrap(), None);
    assert!(store
        .get(&positive.editor_public_key)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn records_survive_a_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("links.redb");
    let rec = record(1, 2, 0, 100);

    {
        let store = RedbLinkStore::open(&path).unwrap();
        store.upsert_if_monotonic(rec.clone()).await.unwrap();
    }

    let store = RedbLinkStore::open(&path).unwrap();
    assert_eq!(store.get(&rec.editor_public_key).await.unwrap(), Some(rec));
}
