//! Job kinds and what a run of one reports.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ScheduleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
  Impact,
  Trending,
  Decay,
}

impl JobKind {
  pub const ALL: [JobKind; 3] = [JobKind::Impact, JobKind::Trending, JobKind::Decay];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Impact => "impact",
      Self::Trending => "trending",
      Self::Decay => "decay",
    }
  }

  pub(crate) fn index(self) -> usize {
    match self {
      Self::Impact => 0,
      Self::Trending => 1,
      Self::Decay => 2,
    }
  }
}

impl fmt::Display for JobKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl ScheduleConfig {
  pub fn period(&self, kind: JobKind) -> Duration {
    let secs = match kind {
      JobKind::Impact => self.impact_secs,
      JobKind::Trending => self.trending_secs,
      JobKind::Decay => self.decay_secs,
    };
    Duration::from_secs(secs)
  }
}

/// Tally of one job run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
  pub job:        JobKind,
  /// Entities (or users) considered.
  pub processed:  usize,
  pub succeeded:  usize,
  /// Ineligible, invariant-violating, or write-contended items.
  pub skipped:    usize,
  /// Items that hit a store error.
  pub failed:     usize,
  pub started_at: DateTime<Utc>,
  pub duration:   Duration,
}

impl CycleReport {
  pub(crate) fn begin(job: JobKind, started_at: DateTime<Utc>) -> Self {
    Self {
      job,
      processed: 0,
      succeeded: 0,
      skipped: 0,
      failed: 0,
      started_at,
      duration: Duration::ZERO,
    }
  }
}

/// What happened when a job was asked to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
  Completed(CycleReport),
  /// A run of the same kind was already in flight.
  Skipped { job: JobKind },
  Failed { job: JobKind, error: String },
}
