//! Deletes expired links on a fixed interval.
//!
//! Deletions flow through the change feed as [`ChangeEvent::Deleted`]
//! events, which the fan-out dispatcher turns into empty-payload
//! announcements for subscribers of the expired link's info hash.
//!
//! [`ChangeEvent::Deleted`]: crate::ChangeEvent::Deleted

use crate::{unix_now, LinkStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// How often expired links are cleared.
pub const EXPIRATION_INTERVAL: Duration = Duration::from_secs(2);

/// The main loop for the expiration sweeper.
///
/// Runs until `shutdown_rx` changes. Sweep failures are logged and the loop
/// keeps going; a transient backend error must not stop expiration.
pub async fn run_expiration_sweeper<S: LinkStore + ?Sized>(
    store: Arc<S>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        target: "link-store",
        "expiration sweeper started (interval: {}s)",
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.delete_expired(unix_now()).await {
                    Ok(0) => {}
                    Ok(count) => {
                        debug!(target: "link-store", count, "swept expired links");
                    }
                    Err(e) => {
                        error!(target: "link-store", error = %e, "expiration sweep failed");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!(target: "link-store", "expiration sweeper shutting down");
                break;
            }
        }
    }
}
