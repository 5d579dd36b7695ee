//! Catalogue and activity types: groups ("waves"), entities ("ripples"),
//! memberships, and the immutable action events they accumulate.
//!
//! Action events and memberships are append-only facts. Everything the
//! engine derives (counters, summaries, scores) is recomputed from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Group ───────────────────────────────────────────────────────────────────

/// A thematic category of entities. Owns the bucket weights and the impact
/// coefficient used to turn eligible actions into a real-world quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
  pub group_id:           Uuid,
  pub name:               String,
  /// Multiplier applied to eligible actions. May be negative for
  /// "reduction" metrics; the sign is kept internally.
  pub impact_coefficient: f64,
  /// Display unit, e.g. `"kg litter"` or `"stigma index points"`.
  pub impact_unit:        String,
  /// Free-text citation for the coefficient.
  pub impact_source:      String,
  /// Per-bucket eligibility weight in `[0, 1]`.
  pub bucket_weights:     BTreeMap<String, f64>,
}

impl Group {
  /// The configured weight for `bucket`, or `None` if the group does not
  /// know the bucket.
  pub fn bucket_weight(&self, bucket: &str) -> Option<f64> {
    self.bucket_weights.get(bucket).copied()
  }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
  #[default]
  Active,
  Archived,
}

impl EntityStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Archived => "archived",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(Self::Active),
      "archived" => Ok(Self::Archived),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

/// A joinable recurring challenge. Belongs to exactly one [`Group`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:      Uuid,
  pub group_id:       Uuid,
  pub title:          String,
  pub status:         EntityStatus,
  pub default_bucket: String,
}

// ─── Membership ──────────────────────────────────────────────────────────────

/// A user's participation in an entity. The source of truth for participant
/// counts; counter-store values are only a cache of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub user_id:   Uuid,
  pub entity_id: Uuid,
  pub joined_at: DateTime<Utc>,
  pub is_active: bool,
}

// ─── Actions ─────────────────────────────────────────────────────────────────

/// An immutable record of one completed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
  pub action_id:   Uuid,
  pub entity_id:   Uuid,
  pub group_id:    Uuid,
  pub user_id:     Uuid,
  pub bucket:      String,
  pub occurred_at: DateTime<Utc>,
}

/// Input to [`crate::store::ActivityLog::record_action`]. The action id is
/// assigned by the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAction {
  pub entity_id:   Uuid,
  pub user_id:     Uuid,
  /// Defaults to the entity's `default_bucket` when absent.
  pub bucket:      Option<String>,
  /// Defaults to now when absent.
  pub occurred_at: Option<DateTime<Utc>>,
}

/// Number of actions in one bucket for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
  pub bucket: String,
  pub count:  u64,
}

/// Number of actions one user made in one bucket of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBucketCount {
  pub entity_id: Uuid,
  pub group_id:  Uuid,
  pub bucket:    String,
  pub count:     u64,
}

/// One member of a time window: an action id (or a user id for joins) and
/// the moment it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
  pub id: Uuid,
  pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_roundtrips_through_str() {
    for status in [EntityStatus::Active, EntityStatus::Archived] {
      assert_eq!(EntityStatus::parse(status.as_str()).unwrap(), status);
    }
    assert!(EntityStatus::parse("paused").is_err());
  }

  #[test]
  fn unknown_bucket_has_no_weight() {
    let group = Group {
      group_id:           Uuid::new_v4(),
      name:               "Environment".into(),
      impact_coefficient: 0.09,
      impact_unit:        "kg".into(),
      impact_source:      "EPA 2023".into(),
      bucket_weights:     BTreeMap::from([("pick_up_litter".to_owned(), 1.0)]),
    };
    assert_eq!(group.bucket_weight("pick_up_litter"), Some(1.0));
    assert_eq!(group.bucket_weight("bring_reusable"), None);
  }
}
