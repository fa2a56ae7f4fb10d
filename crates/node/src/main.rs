//! `linkd` — the link server process.
//!
//! Opens the store, spawns the expiration sweeper and the fan-out
//! dispatcher, and serves the HTTP/WebSocket surface until ctrl-c.

use anyhow::Result;
use clap::Parser;
use link_server::{run_fanout_dispatcher, AppState, Hub, ServerConfig};
use link_store::{run_expiration_sweeper, LinkStore, RedbLinkStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

mod telemetry;

/// Configuration for the linkd binary.
#[derive(Parser, Debug)]
#[command(author, version, about = "An end-to-end encrypted link server", long_about = None)]
struct LinkdOpts {
    /// Address to listen on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    listen_addr: String,

    /// Path to the link database file; created if missing.
    #[arg(long, env = "DB_PATH", default_value = "links.redb")]
    db_path: PathBuf,

    /// Seconds between expiration sweeps.
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 2)]
    sweep_interval_secs: u64,

    /// Dev mode: default the log filter to debug instead of info.
    #[arg(long, env = "DEBUG", default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = LinkdOpts::parse();
    telemetry::init_tracing(opts.debug)?;

    let store = Arc::new(RedbLinkStore::open(&opts.db_path)?);
    let hub = Arc::new(Hub::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(run_expiration_sweeper(
        store.clone(),
        Duration::from_secs(opts.sweep_interval_secs),
        shutdown_rx.clone(),
    ));
    tokio::spawn(run_fanout_dispatcher(
        store.change_feed(),
        hub.clone(),
        shutdown_rx.clone(),
    ));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "linkd", "shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    let state = AppState {
        store: store as Arc<dyn LinkStore>,
        hub,
    };
    let config = ServerConfig {
        listen_addr: opts.listen_addr,
        ..ServerConfig::default()
    };
    link_server::run_server(config, state, shutdown_rx).await
}
