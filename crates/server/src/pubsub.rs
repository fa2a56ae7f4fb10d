//! The WebSocket side of the pub/sub fabric.
//!
//! Each accepted socket gets two tasks: this receive loop, which parses
//! request frames and mutates the subscription index, and a writer task
//! draining the socket's bounded outbound queue into the sink. Backlog
//! scans run as children of the receive loop and are aborted with it, so
//! closing the socket cancels them deterministically.
//!
//! All responses travel through the one outbound queue, which is what
//! guarantees that the SUCCESS ack for a subscribe is written before any
//! ANNOUNCE from that subscribe's backlog scan.

use crate::hub::OutboundSender;
use crate::metrics;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use link_store::{unix_now, LinkStore};
use link_types::protocol::{
    announce_frame, error_without_id_frame, parse_request, success_frame, RequestKind,
};
use link_types::record::InfoHash;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Frames a socket may have in flight before the dispatcher starts
/// dropping announcements for it.
pub(crate) const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Drives one accepted WebSocket until it closes.
pub(crate) async fn serve_socket(socket: WebSocket, state: AppState) {
    let socket_id = state.hub.next_socket_id();
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE_DEPTH);

    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    debug!(target: "link-server", socket_id, "socket accepted");

    // Hashes this socket is subscribed to, owned by the receive loop and
    // used for teardown.
    let mut subscribed: HashSet<InfoHash> = HashSet::new();
    let mut backlog_tasks: Vec<JoinHandle<()>> = Vec::new();

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };

        let frame = match message {
            Message::Binary(frame) => frame,
            Message::Text(_) => {
                if outbound_tx
                    .send(error_without_id_frame("expecting bytes"))
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
            // The transport answers pings on its own.
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let request = match parse_request(&frame) {
            Ok(request) => request,
            Err(err) => {
                let fatal = err.is_fatal();
                if outbound_tx.send(err.to_frame()).await.is_err() || fatal {
                    break;
                }
                continue;
            }
        };

        match request.kind {
            RequestKind::Subscribe => {
                state
                    .hub
                    .subscribe(socket_id, &outbound_tx, &request.info_hashes);
                subscribed.extend(request.info_hashes.iter().copied());

                // Ack first: the SUCCESS is queued before the backlog task
                // exists, so it cannot be overtaken.
                if outbound_tx
                    .send(success_frame(&request.message_id))
                    .await
                    .is_err()
                {
                    break;
                }

                backlog_tasks.push(tokio::spawn(run_backlog_scan(
                    state.store.clone(),
                    outbound_tx.clone(),
                    request.info_hashes,
                )));
                backlog_tasks.retain(|task| !task.is_finished());
            }
            RequestKind::Unsubscribe => {
                state.hub.unsubscribe(socket_id, &request.info_hashes);
                for info_hash in &request.info_hashes {
                    subscribed.remove(info_hash);
                }

                if outbound_tx
                    .send(success_frame(&request.message_id))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    // Teardown runs on every exit path: peer close, receive error,
    // protocol close, or a failed send above.
    for task in &backlog_tasks {
        task.abort();
    }
    let subscribed: Vec<InfoHash> = subscribed.into_iter().collect();
    state.hub.unsubscribe(socket_id, &subscribed);
    drop(outbound_tx);
    let _ = writer.await;

    debug!(target: "link-server", socket_id, "socket closed");
}

/// Seeds a fresh subscription with the live records already stored under
/// its hashes, one ANNOUNCE per record.
async fn run_backlog_scan(
    store: Arc<dyn LinkStore>,
    outbound: OutboundSender,
    info_hashes: Vec<InfoHash>,
) {
    let records = match store
        .find_by_info_hash_live(&info_hashes, unix_now())
        .await
    {
        Ok(records) => records,
        Err(e) => {
            error!(target: "link-server", error = %e, "backlog scan failed");
            return;
        }
    };

    for record in records {
        let frame = announce_frame(&record.editor_public_key, &record.container_signed);
        // A failed send means the socket is gone; abandon the scan.
        if outbound.send(frame).await.is_err() {
            return;
        }
        metrics::ANNOUNCE_TOTAL.with_label_values(&["backlog"]).inc();
    }
}
