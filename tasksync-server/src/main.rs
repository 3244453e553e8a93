//! `tasksync-server`: in-memory REST backend for the `tasksync` client.
//!
//! ```bash
//! # Listen on 127.0.0.1:1337, routes under /api
//! cargo run --bin tasksync-server
//!
//! cargo run --bin tasksync-server -- --bind 0.0.0.0:8080
//! ```

use std::sync::Arc;

use clap::Parser;
use tasksync_server::api;
use tasksync_server::config::{ServerCliArgs, ServerConfig};
use tasksync_server::store::TaskStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting tasksync server");

    match api::start_server_with_state(&config.bind_addr, Arc::new(TaskStore::new())).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
