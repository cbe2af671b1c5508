//! stashd — the stash daemon.
//!
//! Serves the remote state backend over HTTP:
//! - In-memory state store (non-durable)
//! - Namespace resolution from HTTP Basic credentials
//! - Lock coordinator with a fixed-interval retry policy
//!
//! # Usage
//!
//! ```text
//! stashd serve --listen 0.0.0.0:8080 --config /etc/stashd.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use config::StashConfig;

#[derive(Parser)]
#[command(name = "stashd", about = "stash remote state backend")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the state API.
    Serve {
        /// Address to listen on (default 0.0.0.0:8080).
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Path to a stashd.toml config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Wait between lock attempts, in milliseconds.
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Lock retries before reporting a conflict.
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            listen,
            config,
            poll_interval_ms,
            max_retries,
        } => {
            let mut cfg = match config {
                Some(path) => {
                    let cfg = StashConfig::from_file(&path)?;
                    info!(path = ?path, "config loaded");
                    cfg
                }
                None => StashConfig::default(),
            };

            // Flags win over the config file.
            if listen.is_some() {
                cfg.listen = listen;
            }
            if poll_interval_ms.is_some() {
                cfg.locking.poll_interval_ms = poll_interval_ms;
            }
            if max_retries.is_some() {
                cfg.locking.max_retries = max_retries;
            }

            serve(cfg).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,stashd=debug,stash_api=debug,stash_state=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(cfg: StashConfig) -> anyhow::Result<()> {
    info!("stash daemon starting");

    let store = Arc::new(stash_state::InMemoryStateStore::new());
    info!("in-memory state store opened; state does not survive restarts");

    let resolver = cfg.resolver()?;
    info!(mode = ?cfg.auth.mode, "namespace resolver initialized");

    let policy = cfg.lock_policy();
    info!(
        poll_interval_ms = policy.poll_interval.as_millis() as u64,
        max_retries = policy.max_retries,
        "lock policy"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut state = stash_api::ApiState::new(store, resolver)
        .with_lock_policy(policy)
        .with_shutdown(shutdown_rx);
    if let Some(max) = cfg.max_body_bytes {
        state = state.with_max_body_bytes(max);
    }

    // ── Start API server ───────────────────────────────────────

    let router = stash_api::build_router(state);
    let addr = cfg.listen_addr()?;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C; pending lock waits are told to give up.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    info!("stash daemon stopped");
    Ok(())
}
