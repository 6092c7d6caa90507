//! syncd — the SyncGrid daemon.
//!
//! Single binary that assembles the rollout control plane:
//! - State store (redb)
//! - Workload service client
//! - Rollout engine with its recurring evaluation loop
//! - REST API
//!
//! # Usage
//!
//! ```text
//! syncd standalone --port 8008 --data-dir /var/lib/syncgrid \
//!     --workload-api http://workload-api:8007/api/v1/workload
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use syncgrid_rollout::{EngineConfig, RolloutEngine};
use syncgrid_workload::{RetryPolicy, WorkloadApiClient, WorkloadClientConfig};

#[derive(Parser)]
#[command(name = "syncd", about = "SyncGrid rollout daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (API server + evaluation loop in one process).
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8008")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/syncgrid")]
        data_dir: PathBuf,

        /// Rollout evaluation interval in seconds.
        #[arg(long, default_value = "30")]
        eval_interval: u64,

        /// Minutes a step must run healthy before advancing.
        #[arg(long, default_value = "10")]
        health_confirmation_mins: u64,

        /// Base URL of the workload service API.
        #[arg(long, default_value = "http://127.0.0.1:8007/api/v1/workload")]
        workload_api: String,

        /// Timeout for a single workload service request, in seconds.
        #[arg(long, default_value = "10")]
        workload_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,syncd=debug,syncgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            eval_interval,
            health_confirmation_mins,
            workload_api,
            workload_timeout,
        } => {
            run_standalone(
                port,
                data_dir,
                eval_interval,
                health_confirmation_mins,
                workload_api,
                workload_timeout,
            )
            .await
        }
    }
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    eval_interval: u64,
    health_confirmation_mins: u64,
    workload_api: String,
    workload_timeout: u64,
) -> anyhow::Result<()> {
    info!("SyncGrid daemon starting in standalone mode");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("syncgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let state = syncgrid_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Workload service client.
    let client = Arc::new(WorkloadApiClient::new(
        WorkloadClientConfig {
            base_url: workload_api.clone(),
            request_timeout: Duration::from_secs(workload_timeout),
        },
        RetryPolicy::default(),
    ));
    info!(base_url = %workload_api, "workload client initialized");

    // Rollout engine.
    let engine = Arc::new(RolloutEngine::new(
        state.clone(),
        client,
        EngineConfig {
            health_confirmation_mins,
            ..EngineConfig::default()
        },
    ));
    info!(
        interval = eval_interval,
        confirmation_mins = health_confirmation_mins,
        "rollout engine initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    // Evaluation loop.
    let engine_loop = engine.clone();
    let engine_handle = tokio::spawn(async move {
        engine_loop
            .run(Duration::from_secs(eval_interval), shutdown_rx)
            .await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = syncgrid_api::build_router(state, engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = engine_handle.await;

    info!("SyncGrid daemon stopped");
    Ok(())
}
