//! rippl server binary.
//!
//! Reads `rippl.toml` (or the path given with `--config`), opens the SQLite
//! store, and serves the JSON API while the scheduler runs the trending,
//! impact, and decay jobs in the background.
//!
//! ```
//! cargo run -p rippl-server -- --run-once
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use rippl_engine::{JobKind, JobOutcome, Scheduler};
use rippl_server::{ServerConfig, build_state, expand_tilde};
use rippl_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Rippl trending and impact server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rippl.toml")]
  config: PathBuf,

  /// Run every job once, print the outcomes as JSON, and exit.
  #[arg(long)]
  run_once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let state = build_state(store, server_cfg.engine.clone());

  if cli.run_once {
    let mut outcomes = state.scheduler.run_all_now().await;
    outcomes.push(state.scheduler.run_now(JobKind::Decay).await);
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    if outcomes.iter().any(|o| matches!(o, JobOutcome::Failed { .. })) {
      anyhow::bail!("one or more jobs failed");
    }
    return Ok(());
  }

  let scheduler = state.scheduler.clone();
  scheduler.start();

  let app = rippl_api::api_router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  let served = axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal(scheduler.clone()))
    .await
    .context("server error");

  // Let cycles already under way finish before the runtime goes away.
  scheduler.stop();
  scheduler.drain().await;
  served
}

/// Resolve on Ctrl-C, stopping the scheduler first so no new job starts
/// while connections drain.
async fn shutdown_signal<R: rippl_engine::JobRunner>(scheduler: Arc<Scheduler<R>>) {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for Ctrl-C; serving until killed");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown requested");
  scheduler.stop();
}
