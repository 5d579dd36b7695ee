//! The trending and impact aggregation engine.
//!
//! - [`trending`]: reconciles counters against the activity log, scores and
//!   ranks entities, rebuilds leaderboards, and decays boosts.
//! - [`impact`]: bucket-weighted impact, the relative impact index, and
//!   per-user rollups.
//! - [`ingest`]: fire-and-forget counter bumps on actions and joins.
//! - [`scheduler`]: periodic, non-overlapping job runs.
//! - [`read`]: the read paths the HTTP layer serves.
//!
//! Everything here is generic over the store traits in `rippl-core`.

pub mod config;
pub mod error;
pub mod impact;
pub mod ingest;
pub mod job;
pub mod read;
pub mod retry;
pub mod scheduler;
pub mod trending;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use impact::ImpactEngine;
pub use ingest::IngestHook;
pub use job::{CycleReport, JobKind, JobOutcome};
pub use read::ReadService;
pub use scheduler::{Engines, JobRunner, Scheduler};
pub use trending::TrendingEngine;
