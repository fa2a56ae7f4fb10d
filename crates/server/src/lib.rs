#![forbid(unsafe_code)]

//! The HTTP/WebSocket surface of the link server.
//!
//! One axum application serves three concerns: the REST admission engine
//! (`GET`/`PUT` of signed containers), the binary WebSocket pub/sub fabric
//! mounted at `/`, and a Prometheus exposition endpoint. The shared
//! [`AppState`] carries the store handle and the subscription [`Hub`]; both
//! background workers (expiration sweeper, fan-out dispatcher) are spawned
//! by the binary, not here.

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use link_store::LinkStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

mod dispatch;
mod error;
mod hub;
mod metrics;
mod pubsub;
mod rest;

pub use dispatch::{dispatch_event, run_fanout_dispatcher};
pub use error::ApiError;
pub use hub::{Hub, OutboundSender, SocketId};

/// Shared handles available to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The persistent link store.
    pub store: Arc<dyn LinkStore>,
    /// The in-memory subscription index.
    pub hub: Arc<Hub>,
}

/// Configuration for the HTTP server.
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: String,
    /// Outer request-body guard. The admission engine enforces the exact
    /// 433-byte container bound itself; this only stops abusive bodies
    /// before they buffer.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// Builds the axum application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(rest::root))
        .route("/metrics", get(metrics::metrics_handler))
        .route(
            "/:editor_public_key_base64",
            get(rest::get_link).put(rest::put_link),
        )
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds and serves the application until `shutdown_rx` changes.
pub async fn run_server(
    config: ServerConfig,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let app = app(state).layer(RequestBodyLimitLayer::new(config.body_limit_bytes));

    let addr: SocketAddr = config.listen_addr.parse()?;
    tracing::info!(target: "link-server", "link server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        tracing::info!(target: "link-server", "shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(target: "link-server", error = %e, "server error");
    }

    Ok(())
}
