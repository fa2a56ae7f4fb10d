//! The fan-out dispatcher: change feed in, ANNOUNCE frames out.

use crate::hub::Hub;
use crate::metrics;
use link_store::{unix_now, ChangeEvent};
use link_types::protocol::announce_frame;
use link_types::record::InfoHash;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// The main loop of the dispatcher.
///
/// Consumes the store's change feed until the feed closes or shutdown is
/// signalled. A lagged receiver drops events; subscribers recover past
/// state through backlog scans, never through the feed.
pub async fn run_fanout_dispatcher(
    mut feed: broadcast::Receiver<ChangeEvent>,
    hub: Arc<Hub>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(target: "link-server", "fan-out dispatcher started");

    loop {
        tokio::select! {
            event = feed.recv() => match event {
                Ok(event) => dispatch_event(&hub, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        target: "link-server",
                        skipped,
                        "change feed lagged; announcements were dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    info!(target: "link-server", "fan-out dispatcher shutting down");
}

/// Announces one change event to every subscriber of its pre- or
/// post-image info hash.
///
/// The frame carries the post-image container while it is still live;
/// a delete, or a post-image that expired between commit and dispatch,
/// announces with an empty container body. Sending on both hashes is what
/// lets subscribers follow a link across an info-hash change.
pub fn dispatch_event(hub: &Hub, event: &ChangeEvent) {
    let mut info_hashes: Vec<InfoHash> = Vec::with_capacity(2);
    if let Some(before) = event.before() {
        info_hashes.push(before.info_hash);
    }
    if let Some(after) = event.after() {
        info_hashes.push(after.info_hash);
    }

    let recipients = hub.subscribers(&info_hashes);
    if recipients.is_empty() {
        return;
    }

    // Every event variant carries at least one image, so an editor key is
    // always present; prefer the post-image's.
    let Some(record) = event.after().or_else(|| event.before()) else {
        return;
    };

    let payload: &[u8] = match event.after() {
        Some(after) if after.expiration > unix_now() => &after.container_signed,
        _ => &[],
    };

    let frame = announce_frame(&record.editor_public_key, payload);
    for (socket_id, sender) in recipients {
        // Best-effort: a closed or saturated socket loses this frame, the
        // rest still get theirs.
        match sender.try_send(frame.clone()) {
            Ok(()) => {
                metrics::ANNOUNCE_TOTAL.with_label_values(&["live"]).inc();
            }
            Err(e) => {
                debug!(
                    target: "link-server",
                    socket_id,
                    "dropping announcement: {}",
                    e
                );
            }
        }
    }
}
