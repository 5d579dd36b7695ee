//! Engine tunables.
//!
//! Every field has a serde default, so an empty `[engine]` table (or none at
//! all) yields the production settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub trending: TrendingConfig,
  pub impact:   ImpactConfig,
  pub schedule: ScheduleConfig,
  pub ingest:   IngestConfig,
}

// ─── Trending ────────────────────────────────────────────────────────────────

/// Coefficients of the trending score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
  pub participants:     f64,
  pub actions_24h:      f64,
  pub actions_1h:       f64,
  pub new_participants: f64,
  pub boost:            f64,
}

impl Default for ScoreWeights {
  fn default() -> Self {
    Self {
      participants:     1.0,
      actions_24h:      0.8,
      actions_1h:       1.5,
      new_participants: 0.5,
      boost:            1.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendingConfig {
  pub weights:                 ScoreWeights,
  pub boost_half_life_secs:    f64,
  /// Added to `boost` for every completed action.
  pub boost_per_action:        f64,
  /// Decayed boosts below this collapse to zero in the decay job.
  pub boost_floor:             f64,
  /// Entities with fewer participants are hidden from trending output.
  pub min_participants:        u64,
  pub top_n:                   usize,
  /// Lower bound on the rank score needed to count as top-N.
  pub top_score_floor:         f64,
  pub cool_off_days:           i64,
  pub cool_off_factor:         f64,
  pub leaderboard_ttl_secs:    u64,
  /// Raw window entries older than this are pruned.
  pub window_secs:             i64,
  /// Expiry applied to an entity's counter keys on every write.
  pub counter_ttl_secs:        u64,
  pub snapshot_retention_days: i64,
}

impl Default for TrendingConfig {
  fn default() -> Self {
    Self {
      weights:                 ScoreWeights::default(),
      boost_half_life_secs:    7200.0,
      boost_per_action:        10.0,
      boost_floor:             0.01,
      min_participants:        8,
      top_n:                   10,
      top_score_floor:         50.0,
      cool_off_days:           7,
      cool_off_factor:         0.7,
      leaderboard_ttl_secs:    30 * 60,
      window_secs:             24 * 60 * 60,
      counter_ttl_secs:        25 * 60 * 60,
      snapshot_retention_days: 7,
    }
  }
}

impl TrendingConfig {
  pub fn leaderboard_ttl(&self) -> Duration {
    Duration::from_secs(self.leaderboard_ttl_secs)
  }

  pub fn counter_ttl(&self) -> Duration { Duration::from_secs(self.counter_ttl_secs) }
}

// ─── Impact ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
  /// An index is only shown with at least this many participants...
  pub min_participants:   u64,
  /// ...and at least this many eligible actions in the window.
  pub min_eligible:       f64,
  pub window_days:        i64,
  /// Version-conflict retries for one summary write.
  pub max_write_attempts: u32,
}

impl Default for ImpactConfig {
  fn default() -> Self {
    Self {
      min_participants:   8,
      min_eligible:       20.0,
      window_days:        30,
      max_write_attempts: 3,
    }
  }
}

// ─── Scheduling ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
  pub impact_secs:   u64,
  pub trending_secs: u64,
  pub decay_secs:    u64,
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      impact_secs:   30 * 60,
      trending_secs: 10 * 60,
      decay_secs:    60 * 60,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Delay between the counter bump and the per-entity impact refresh.
  pub refresh_delay_ms: u64,
}

impl Default for IngestConfig {
  fn default() -> Self { Self { refresh_delay_ms: 1000 } }
}

impl IngestConfig {
  pub fn refresh_delay(&self) -> Duration { Duration::from_millis(self.refresh_delay_ms) }
}
