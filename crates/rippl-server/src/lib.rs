//! Wiring for the `rippl` binary: configuration and the in-process stack
//! (SQLite log and summaries, in-memory counters, engines, scheduler).

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use rippl_api::AppState;
use rippl_counters::MemoryCounterStore;
use rippl_engine::{
  EngineConfig, Engines, ImpactEngine, IngestHook, ReadService, Scheduler,
  TrendingEngine,
};
use rippl_store_sqlite::SqliteStore;
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `rippl.toml` and
/// `RIPPL_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub engine:     EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/rippl/rippl.db"),
      engine:     EngineConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Layer an optional TOML file and the environment. Nested keys use `__`,
  /// e.g. `RIPPL_ENGINE__TRENDING__TOP_N=5`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("RIPPL")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }
}

// ─── Stack ────────────────────────────────────────────────────────────────────

pub type State = AppState<MemoryCounterStore, SqliteStore, SqliteStore>;

/// Build engines, scheduler, and hook over one SQLite store.
pub fn build_state(store: SqliteStore, engine: EngineConfig) -> State {
  let config = Arc::new(engine);
  let store = Arc::new(store);
  let counters = Arc::new(MemoryCounterStore::new(config.trending.counter_ttl()));

  let impact = Arc::new(ImpactEngine::new(store.clone(), store.clone(), config.clone()));
  let trending = Arc::new(TrendingEngine::new(
    counters.clone(),
    store.clone(),
    store.clone(),
    config.clone(),
  ));
  let scheduler = Scheduler::new(
    Arc::new(Engines { trending, impact: impact.clone() }),
    config.schedule.clone(),
  );

  AppState {
    read:      Arc::new(ReadService::new(
      counters.clone(),
      store.clone(),
      store.clone(),
      config.clone(),
    )),
    impact:    impact.clone(),
    scheduler: Arc::new(scheduler),
    ingest:    IngestHook::new(counters, impact, config),
    log:       store,
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
