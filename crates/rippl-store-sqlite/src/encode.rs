//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (nanosecond
//! precision, `Z` suffix) so that lexical order in SQL matches time order.
//! UUIDs are hyphenated lowercase strings. Counts are `INTEGER`s; bucket
//! weights and user-impact breakdowns are compact JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rippl_core::{
  aggregate::{GroupImpact, ImpactIndex, Summary, TrendingSnapshot, UserImpact},
  catalog::{ActionEvent, Entity, EntityStatus, Group, Membership},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(column: &'static str, value: i64) -> Result<u64> {
  u64::try_from(value).map_err(|_| Error::NegativeCount { column, value })
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_weights(weights: &BTreeMap<String, f64>) -> Result<String> {
  Ok(serde_json::to_string(weights)?)
}

pub fn encode_breakdown(groups: &[GroupImpact]) -> Result<String> {
  Ok(serde_json::to_string(groups)?)
}

// ─── Catalogue rows ──────────────────────────────────────────────────────────

pub const GROUP_COLUMNS: &str =
  "group_id, name, impact_coefficient, impact_unit, impact_source, bucket_weights";

pub struct RawGroup {
  pub group_id:           String,
  pub name:               String,
  pub impact_coefficient: f64,
  pub impact_unit:        String,
  pub impact_source:      String,
  pub bucket_weights:     String,
}

impl RawGroup {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:           row.get(0)?,
      name:               row.get(1)?,
      impact_coefficient: row.get(2)?,
      impact_unit:        row.get(3)?,
      impact_source:      row.get(4)?,
      bucket_weights:     row.get(5)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    Ok(Group {
      group_id:           decode_uuid(&self.group_id)?,
      name:               self.name,
      impact_coefficient: self.impact_coefficient,
      impact_unit:        self.impact_unit,
      impact_source:      self.impact_source,
      bucket_weights:     serde_json::from_str(&self.bucket_weights)?,
    })
  }
}

pub const ENTITY_COLUMNS: &str =
  "entity_id, group_id, title, status, default_bucket";

pub struct RawEntity {
  pub entity_id:      String,
  pub group_id:       String,
  pub title:          String,
  pub status:         String,
  pub default_bucket: String,
}

impl RawEntity {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:      row.get(0)?,
      group_id:       row.get(1)?,
      title:          row.get(2)?,
      status:         row.get(3)?,
      default_bucket: row.get(4)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      entity_id:      decode_uuid(&self.entity_id)?,
      group_id:       decode_uuid(&self.group_id)?,
      title:          self.title,
      status:         EntityStatus::parse(&self.status)?,
      default_bucket: self.default_bucket,
    })
  }
}

pub struct RawMembership {
  pub user_id:   String,
  pub entity_id: String,
  pub joined_at: String,
  pub is_active: bool,
}

impl RawMembership {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:   row.get(0)?,
      entity_id: row.get(1)?,
      joined_at: row.get(2)?,
      is_active: row.get(3)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      user_id:   decode_uuid(&self.user_id)?,
      entity_id: decode_uuid(&self.entity_id)?,
      joined_at: decode_dt(&self.joined_at)?,
      is_active: self.is_active,
    })
  }
}

/// An action as it was written; used only to echo the stored row back.
pub fn action_event(
  action_id: Uuid,
  entity: &Entity,
  user_id: Uuid,
  bucket: String,
  occurred_at: DateTime<Utc>,
) -> ActionEvent {
  ActionEvent {
    action_id,
    entity_id: entity.entity_id,
    group_id: entity.group_id,
    user_id,
    bucket,
    occurred_at,
  }
}

// ─── Aggregate rows ──────────────────────────────────────────────────────────

pub const SUMMARY_COLUMNS: &str = "entity_id, participants, actions_total, \
   impact_lifetime, impact_30d, impact_unit, updated_at, version";

pub struct RawSummary {
  pub entity_id:       String,
  pub participants:    i64,
  pub actions_total:   i64,
  pub impact_lifetime: f64,
  pub impact_30d:      f64,
  pub impact_unit:     String,
  pub updated_at:      String,
  pub version:         i64,
}

impl RawSummary {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:       row.get(0)?,
      participants:    row.get(1)?,
      actions_total:   row.get(2)?,
      impact_lifetime: row.get(3)?,
      impact_30d:      row.get(4)?,
      impact_unit:     row.get(5)?,
      updated_at:      row.get(6)?,
      version:         row.get(7)?,
    })
  }

  pub fn into_summary(self) -> Result<Summary> {
    Ok(Summary {
      entity_id:       decode_uuid(&self.entity_id)?,
      participants:    decode_count("participants", self.participants)?,
      actions_total:   decode_count("actions_total", self.actions_total)?,
      impact_lifetime: self.impact_lifetime,
      impact_30d:      self.impact_30d,
      impact_unit:     self.impact_unit,
      updated_at:      decode_dt(&self.updated_at)?,
      version:         decode_count("version", self.version)?,
    })
  }
}

pub const SNAPSHOT_COLUMNS: &str = "entity_id, group_id, score, rank_score, \
   participants, actions_24h, actions_1h, new_participants_24h, boost, \
   is_top_ten, top_ten_days, calculated_at";

pub struct RawSnapshot {
  pub entity_id:            String,
  pub group_id:             String,
  pub score:                f64,
  pub rank_score:           f64,
  pub participants:         i64,
  pub actions_24h:          i64,
  pub actions_1h:           i64,
  pub new_participants_24h: i64,
  pub boost:                f64,
  pub is_top_ten:           bool,
  pub top_ten_days:         i64,
  pub calculated_at:        String,
}

impl RawSnapshot {
  /// Reads the [`SNAPSHOT_COLUMNS`] starting at column `0`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:            row.get(0)?,
      group_id:             row.get(1)?,
      score:                row.get(2)?,
      rank_score:           row.get(3)?,
      participants:         row.get(4)?,
      actions_24h:          row.get(5)?,
      actions_1h:           row.get(6)?,
      new_participants_24h: row.get(7)?,
      boost:                row.get(8)?,
      is_top_ten:           row.get(9)?,
      top_ten_days:         row.get(10)?,
      calculated_at:        row.get(11)?,
    })
  }

  pub fn into_snapshot(self) -> Result<TrendingSnapshot> {
    let top_ten_days = decode_count("top_ten_days", self.top_ten_days)?;
    Ok(TrendingSnapshot {
      entity_id:            decode_uuid(&self.entity_id)?,
      group_id:             decode_uuid(&self.group_id)?,
      score:                self.score,
      rank_score:           self.rank_score,
      participants:         decode_count("participants", self.participants)?,
      actions_24h:          decode_count("actions_24h", self.actions_24h)?,
      actions_1h:           decode_count("actions_1h", self.actions_1h)?,
      new_participants_24h: decode_count(
        "new_participants_24h",
        self.new_participants_24h,
      )?,
      boost:                self.boost,
      is_top_ten:           self.is_top_ten,
      top_ten_days:         u32::try_from(top_ten_days).unwrap_or(u32::MAX),
      calculated_at:        decode_dt(&self.calculated_at)?,
    })
  }
}

pub const IMPACT_INDEX_COLUMNS: &str = "entity_id, group_id, index_score, \
   median_impact, ripple_impact, participant_count, eligible_actions, \
   is_visible, calculated_at";

pub struct RawImpactIndex {
  pub entity_id:         String,
  pub group_id:          String,
  pub index_score:       f64,
  pub median_impact:     f64,
  pub ripple_impact:     f64,
  pub participant_count: i64,
  pub eligible_actions:  f64,
  pub is_visible:        bool,
  pub calculated_at:     String,
}

impl RawImpactIndex {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:         row.get(0)?,
      group_id:          row.get(1)?,
      index_score:       row.get(2)?,
      median_impact:     row.get(3)?,
      ripple_impact:     row.get(4)?,
      participant_count: row.get(5)?,
      eligible_actions:  row.get(6)?,
      is_visible:        row.get(7)?,
      calculated_at:     row.get(8)?,
    })
  }

  pub fn into_index(self) -> Result<ImpactIndex> {
    Ok(ImpactIndex {
      entity_id:         decode_uuid(&self.entity_id)?,
      group_id:          decode_uuid(&self.group_id)?,
      index_score:       self.index_score,
      median_impact:     self.median_impact,
      ripple_impact:     self.ripple_impact,
      participant_count: decode_count(
        "participant_count",
        self.participant_count,
      )?,
      eligible_actions:  self.eligible_actions,
      is_visible:        self.is_visible,
      calculated_at:     decode_dt(&self.calculated_at)?,
    })
  }
}

pub const USER_IMPACT_COLUMNS: &str = "user_id, total_actions, \
   eligible_actions, entities_joined, lifetime, window_30d, calculated_at";

pub struct RawUserImpact {
  pub user_id:          String,
  pub total_actions:    i64,
  pub eligible_actions: f64,
  pub entities_joined:  i64,
  pub lifetime:         String,
  pub window_30d:       String,
  pub calculated_at:    String,
}

impl RawUserImpact {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:          row.get(0)?,
      total_actions:    row.get(1)?,
      eligible_actions: row.get(2)?,
      entities_joined:  row.get(3)?,
      lifetime:         row.get(4)?,
      window_30d:       row.get(5)?,
      calculated_at:    row.get(6)?,
    })
  }

  pub fn into_user_impact(self) -> Result<UserImpact> {
    Ok(UserImpact {
      user_id:          decode_uuid(&self.user_id)?,
      total_actions:    decode_count("total_actions", self.total_actions)?,
      eligible_actions: self.eligible_actions,
      entities_joined:  decode_count("entities_joined", self.entities_joined)?,
      lifetime:         serde_json::from_str(&self.lifetime)?,
      window_30d:       serde_json::from_str(&self.window_30d)?,
      calculated_at:    decode_dt(&self.calculated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  #[test]
  fn encoded_timestamps_sort_lexically() {
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let t1 = t0 + Duration::milliseconds(500);
    let t2 = t0 + Duration::seconds(1);
    let mut encoded = vec![encode_dt(t2), encode_dt(t0), encode_dt(t1)];
    encoded.sort();
    assert_eq!(encoded, vec![encode_dt(t0), encode_dt(t1), encode_dt(t2)]);
  }

  #[test]
  fn timestamps_roundtrip_exactly() {
    let t = Utc::now();
    assert_eq!(decode_dt(&encode_dt(t)).unwrap(), t);
  }

  #[test]
  fn negative_count_is_rejected() {
    assert!(matches!(
      decode_count("participants", -1),
      Err(Error::NegativeCount { column: "participants", value: -1 })
    ));
  }
}
