//! The in-memory subscription index.
//!
//! A bipartite relation between live sockets and info hashes. The hash side
//! lives here; each socket task owns its own set of subscribed hashes and
//! hands it back through [`Hub::unsubscribe`] on teardown. The hub stores
//! each socket's bounded outbound sender rather than the socket itself, so
//! the fan-out dispatcher never touches a WebSocket directly.

use dashmap::DashMap;
use link_types::record::InfoHash;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Identifies one live socket for the lifetime of its connection.
pub type SocketId = u64;

/// The sending half of a socket's bounded outbound frame queue.
pub type OutboundSender = mpsc::Sender<Vec<u8>>;

/// The subscription index, owned by the service and shared by reference
/// with every socket task and the dispatcher.
#[derive(Default)]
pub struct Hub {
    subscriptions: DashMap<InfoHash, HashMap<SocketId, OutboundSender>>,
    next_socket_id: AtomicU64,
}

impl Hub {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id for a newly accepted socket.
    pub fn next_socket_id(&self) -> SocketId {
        self.next_socket_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribes a socket to each listed hash. Idempotent per hash: a
    /// repeated subscribe leaves the index unchanged.
    pub fn subscribe(&self, socket_id: SocketId, sender: &OutboundSender, info_hashes: &[InfoHash]) {
        for info_hash in info_hashes {
            self.subscriptions
                .entry(*info_hash)
                .or_default()
                .insert(socket_id, sender.clone());
        }
    }

    /// Removes a socket from each listed hash; unknown hashes are a no-op.
    /// Buckets left empty are pruned so the map does not accumulate dead
    /// topics.
    pub fn unsubscribe(&self, socket_id: SocketId, info_hashes: &[InfoHash]) {
        for info_hash in info_hashes {
            if let Some(mut bucket) = self.subscriptions.get_mut(info_hash) {
                bucket.remove(&socket_id);
            }
            self.subscriptions
                .remove_if(info_hash, |_, bucket| bucket.is_empty());
        }
    }

    /// A deduplicated snapshot of every subscriber of any listed hash.
    ///
    /// The union is built by copying senders out under the shard locks;
    /// callers iterate the snapshot without holding any lock, so a slow
    /// send can never block index mutation.
    pub fn subscribers(&self, info_hashes: &[InfoHash]) -> Vec<(SocketId, OutboundSender)> {
        let mut union: HashMap<SocketId, OutboundSender> = HashMap::new();
        for info_hash in info_hashes {
            if let Some(bucket) = self.subscriptions.get(info_hash) {
                for (socket_id, sender) in bucket.iter() {
                    union.entry(*socket_id).or_insert_with(|| sender.clone());
                }
            }
        }
        union.into_iter().collect()
    }

    /// Number of hashes with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> OutboundSender {
        mpsc::channel(4).0
    }

    const HASH_A: InfoHash = InfoHash([1; 32]);
    const HASH_B: InfoHash = InfoHash([2; 32]);

    #[test]
    fn subscribe_is_idempotent_per_hash() {
        let hub = Hub::new();
        let id = hub.next_socket_id();
        let tx = sender();

        hub.subscribe(id, &tx, &[HASH_A, HASH_A]);
        hub.subscribe(id, &tx, &[HASH_A]);

        assert_eq!(hub.subscribers(&[HASH_A]).len(), 1);
        assert_eq!(hub.topic_count(), 1);
    }

    #[test]
    fn unsubscribe_prunes_empty_buckets() {
        let hub = Hub::new();
        let id = hub.next_socket_id();
        let tx = sender();

        hub.subscribe(id, &tx, &[HASH_A, HASH_B]);
        assert_eq!(hub.topic_count(), 2);

        hub.unsubscribe(id, &[HASH_A]);
        assert!(hub.subscribers(&[HASH_A]).is_empty());
        assert_eq!(hub.topic_count(), 1);

        // Unknown hashes and repeated unsubscribes are no-ops.
        hub.unsubscribe(id, &[HASH_A]);
        hub.unsubscribe(hub.next_socket_id(), &[HASH_B]);
        assert_eq!(hub.subscribers(&[HASH_B]).len(), 1);
    }

    #[test]
    fn subscriber_union_dedupes_across_hashes() {
        let hub = Hub::new();
        let both = hub.next_socket_id();
        let only_b = hub.next_socket_id();
        let tx = sender();

        hub.subscribe(both, &tx, &[HASH_A, HASH_B]);
        hub.subscribe(only_b, &tx, &[HASH_B]);

        // A socket subscribed to both hashes appears once in the union.
        let union = hub.subscribers(&[HASH_A, HASH_B]);
        assert_eq!(union.len(), 2);

        let ids: std::collections::HashSet<SocketId> =
            union.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&both) && ids.contains(&only_b));
    }

    #[test]
    fn teardown_removes_every_direction() {
        let hub = Hub::new();
        let id = hub.next_socket_id();
        let tx = sender();
        let subscribed = [HASH_A, HASH_B];

        hub.subscribe(id, &tx, &subscribed);
        hub.unsubscribe(id, &subscribed);

        assert!(hub.subscribers(&subscribed).is_empty());
        assert_eq!(hub.topic_count(), 0);
    }
}
