//! dispatchd: the edge dispatch daemon.
//!
//! Single binary that assembles:
//! - Binding store (redb)
//! - Node registry client (Kubernetes node API or static nodes file)
//! - Dispatcher + node directory refresh
//! - HTTP API
//!
//! # Usage
//!
//! ```text
//! dispatchd serve --config /etc/edge-dispatch/dispatchd.toml --port 6442
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dispatch_engine::Dispatcher;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{DispatchConfig, Overrides, RefreshMode, RegistryKind};

#[derive(Parser)]
#[command(name = "dispatchd", about = "Edge dispatch daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve device dispatch requests.
    Serve {
        /// TOML config file. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the binding database.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Label key that marks a node as edge-capable.
        #[arg(long)]
        edge_label: Option<String>,

        /// Node registry backend.
        #[arg(long, value_enum)]
        registry: Option<RegistryKind>,

        /// Node API base URL (kube registry).
        #[arg(long)]
        registry_url: Option<String>,

        /// Nodes file (static registry).
        #[arg(long)]
        nodes_file: Option<PathBuf>,

        /// When the node directory is rebuilt.
        #[arg(long, value_enum)]
        refresh: Option<RefreshMode>,

        /// Background refresh period, e.g. "30s" (interval mode).
        #[arg(long)]
        refresh_interval: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            edge_label,
            registry,
            registry_url,
            nodes_file,
            refresh,
            refresh_interval,
        } => {
            let mut cfg = match config {
                Some(path) => DispatchConfig::from_file(&path)?,
                None => DispatchConfig::default(),
            };
            cfg.apply(Overrides {
                port,
                data_dir,
                edge_label,
                registry,
                api_url: registry_url,
                nodes_file,
                refresh,
                refresh_interval,
            });
            run_serve(cfg).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dispatchd=debug,dispatch=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run_serve(cfg: DispatchConfig) -> anyhow::Result<()> {
    info!("edge dispatch daemon starting");

    let request_timeout = cfg.request_timeout()?;
    let policy = cfg.refresh_policy()?;

    // ── Initialize subsystems ──────────────────────────────────

    // Binding store. Failure here is fatal.
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;
    let db_path = cfg.db_path();
    let store = dispatch_state::RedbBindingStore::open(&db_path)
        .with_context(|| format!("opening binding store {}", db_path.display()))?;
    info!(path = ?db_path, "binding store opened");

    // Node registry.
    let registry = cfg.build_registry()?;
    info!(kind = registry.kind(), "node registry initialized");

    // Dispatcher.
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(store),
        cfg.edge_label.clone(),
        policy,
    ));
    info!(edge_label = %cfg.edge_label, ?policy, "dispatcher initialized");

    match dispatcher.refresh().await {
        Some(count) => info!(count, "initial node directory built"),
        None => warn!("initial node directory refresh failed, starting empty"),
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let refresh_handle = policy.interval().map(|interval| {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            dispatcher.run_refresh_loop(interval, shutdown).await;
        })
    });

    // ── Start API server ───────────────────────────────────────

    let router = dispatch_api::build_router(dispatcher, request_timeout);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    if let Some(handle) = refresh_handle {
        let _ = handle.await;
    }

    info!("edge dispatch daemon stopped");
    Ok(())
}
