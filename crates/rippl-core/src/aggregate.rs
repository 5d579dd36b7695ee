//! Durable aggregates derived by the engine: per-entity summaries, trending
//! snapshots, impact indexes, and per-user impact rollups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Long-lived per-entity aggregate, guarded by an optimistic version.
///
/// `version` increments on every successful write. Version 0 is reserved for
/// "no row yet"; the first write creates version 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  pub entity_id:       Uuid,
  pub participants:    u64,
  pub actions_total:   u64,
  /// Signed lifetime impact (eligible actions × coefficient).
  pub impact_lifetime: f64,
  /// Signed trailing-30-day impact.
  pub impact_30d:      f64,
  pub impact_unit:     String,
  pub updated_at:      DateTime<Utc>,
  pub version:         u64,
}

/// The mutable part of a [`Summary`]; what a writer proposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDraft {
  pub entity_id:       Uuid,
  pub participants:    u64,
  pub actions_total:   u64,
  pub impact_lifetime: f64,
  pub impact_30d:      f64,
  pub impact_unit:     String,
}

impl SummaryDraft {
  /// Start a draft from the current row, or from zeroes if there is none.
  pub fn from_current(entity_id: Uuid, current: Option<&Summary>) -> Self {
    match current {
      Some(s) => Self {
        entity_id,
        participants: s.participants,
        actions_total: s.actions_total,
        impact_lifetime: s.impact_lifetime,
        impact_30d: s.impact_30d,
        impact_unit: s.impact_unit.clone(),
      },
      None => Self {
        entity_id,
        participants: 0,
        actions_total: 0,
        impact_lifetime: 0.0,
        impact_30d: 0.0,
        impact_unit: String::new(),
      },
    }
  }
}

/// Result of a version-checked summary write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
  Committed(Summary),
  /// The row's version no longer matched the one the writer read.
  Conflict,
}

// ─── Trending ────────────────────────────────────────────────────────────────

/// One entity's trending result for one calculation run. Keyed by
/// `(entity_id, calculated_at)` so history can be retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingSnapshot {
  pub entity_id:            Uuid,
  pub group_id:             Uuid,
  /// Raw score, before any cool-off penalty.
  pub score:                f64,
  /// Score used for ranking (cool-off applied).
  pub rank_score:           f64,
  pub participants:         u64,
  pub actions_24h:          u64,
  pub actions_1h:           u64,
  pub new_participants_24h: u64,
  pub boost:                f64,
  pub is_top_ten:           bool,
  pub top_ten_days:         u32,
  pub calculated_at:        DateTime<Utc>,
}

// ─── Impact ──────────────────────────────────────────────────────────────────

/// An entity's impact relative to the median of its group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactIndex {
  pub entity_id:         Uuid,
  pub group_id:          Uuid,
  /// Always within `[0.5, 3.0]`.
  pub index_score:       f64,
  pub median_impact:     f64,
  /// Absolute trailing-30-day impact of this entity.
  pub ripple_impact:     f64,
  pub participant_count: u64,
  pub eligible_actions:  f64,
  /// Derived gate; the score is stored either way but only surfaced when
  /// this is set.
  pub is_visible:        bool,
  pub calculated_at:     DateTime<Utc>,
}

/// One group's share of a user's impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupImpact {
  pub group_id: Uuid,
  pub actions:  u64,
  pub eligible: f64,
  /// Signed; take `abs` for display.
  pub impact:   f64,
  pub unit:     String,
}

/// A user's impact across all joined entities, grouped by parent group.
/// Recomputed in full on every impact cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserImpact {
  pub user_id:          Uuid,
  pub total_actions:    u64,
  pub eligible_actions: f64,
  pub entities_joined:  u64,
  pub lifetime:         Vec<GroupImpact>,
  pub window_30d:       Vec<GroupImpact>,
  pub calculated_at:    DateTime<Utc>,
}

impl UserImpact {
  /// The group with the most actions in the 30-day window, if any. Ties go
  /// to the smaller group id so the choice is stable.
  pub fn primary_group(&self) -> Option<&GroupImpact> {
    self
      .window_30d
      .iter()
      .filter(|g| g.actions > 0)
      .max_by(|a, b| {
        a.actions
          .cmp(&b.actions)
          .then_with(|| b.group_id.cmp(&a.group_id))
      })
  }
}
