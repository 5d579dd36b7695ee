//! Store traits the engine is written against.
//!
//! - [`CounterStore`]: the fast, ephemeral counter service (hash fields,
//!   sorted sets, per-key expiry).
//! - [`ActivityLog`]: the append-only catalogue of groups, entities,
//!   memberships, and action events. Source of truth for every count.
//! - [`SummaryStore`]: the durable, version-guarded home of derived
//!   aggregates.
//!
//! All methods return `Send` futures so implementations can be shared across
//! tokio tasks.

use std::{collections::HashMap, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  aggregate::{
    ImpactIndex, Summary, SummaryDraft, TrendingSnapshot, UserImpact,
    WriteOutcome,
  },
  catalog::{
    ActionEvent, BucketCount, Entity, EntityStatus, Group, Membership,
    NewAction, UserBucketCount, WindowEntry,
  },
};

// ─── CounterStore ────────────────────────────────────────────────────────────

/// Low-latency counter service.
///
/// Every operation is atomic for the single key it touches; there are no
/// multi-key transactions. A write that creates a key also applies the
/// store's default expiry so abandoned keys cannot accumulate.
pub trait CounterStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Hash fields ───────────────────────────────────────────────────────

  /// Atomically add `delta` to `field` of `key` and return the new value.
  fn increment<'a>(
    &'a self,
    key: &'a str,
    field: &'a str,
    delta: f64,
  ) -> impl Future<Output = Result<f64, Self::Error>> + Send + 'a;

  fn set_field<'a>(
    &'a self,
    key: &'a str,
    field: &'a str,
    value: f64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn remove_field<'a>(
    &'a self,
    key: &'a str,
    field: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// All fields of `key`; empty if the key is absent or expired.
  fn get_all<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<HashMap<String, f64>, Self::Error>> + Send + 'a;

  // ── Key lifecycle ─────────────────────────────────────────────────────

  fn set_expiry<'a>(
    &'a self,
    key: &'a str,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Drop every expired key; returns how many were removed.
  fn purge_expired(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Sorted sets ───────────────────────────────────────────────────────

  /// Insert or re-score `member`.
  fn rank_update<'a>(
    &'a self,
    key: &'a str,
    member: &'a str,
    score: f64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Up to `n` members by score descending; equal scores by member
  /// ascending.
  fn rank_top<'a>(
    &'a self,
    key: &'a str,
    n: usize,
  ) -> impl Future<Output = Result<Vec<(String, f64)>, Self::Error>> + Send + 'a;

  fn rank_score<'a>(
    &'a self,
    key: &'a str,
    member: &'a str,
  ) -> impl Future<Output = Result<Option<f64>, Self::Error>> + Send + 'a;

  /// Number of members scored within `[min, max]`.
  fn rank_count<'a>(
    &'a self,
    key: &'a str,
    min: f64,
    max: f64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Remove members scored `<= max_score`; returns how many were removed.
  fn rank_prune<'a>(
    &'a self,
    key: &'a str,
    max_score: f64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

// ─── ActivityLog ─────────────────────────────────────────────────────────────

/// The append-only record of who joined what and who did what.
///
/// Writes here are owned by the action-completion and onboarding flows; the
/// engine only reads. Counts are always derived at query time.
pub trait ActivityLog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Catalogue ─────────────────────────────────────────────────────────

  /// Insert or replace a group and its bucket weights.
  fn put_group(
    &self,
    group: Group,
  ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

  fn put_entity(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  fn get_group(
    &self,
    group_id: Uuid,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  fn list_groups(
    &self,
  ) -> impl Future<Output = Result<Vec<Group>, Self::Error>> + Send + '_;

  fn get_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// All entities, optionally restricted to one status.
  fn list_entities(
    &self,
    status: Option<EntityStatus>,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  // ── Appends ───────────────────────────────────────────────────────────

  /// Append an action. Fails if the entity does not exist.
  fn record_action(
    &self,
    input: NewAction,
  ) -> impl Future<Output = Result<ActionEvent, Self::Error>> + Send + '_;

  /// Record (or re-activate) a membership.
  fn join(
    &self,
    user_id: Uuid,
    entity_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Deactivate a membership. Returns `false` if there was no active one.
  fn leave(
    &self,
    user_id: Uuid,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Per-entity reads ──────────────────────────────────────────────────

  /// Active members, optionally only those who joined at or after `since`.
  fn count_participants(
    &self,
    entity_id: Uuid,
    joined_since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn count_actions(
    &self,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn bucket_counts(
    &self,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<BucketCount>, Self::Error>> + Send + '_;

  /// Actions at or after `since`, as window entries keyed by action id.
  fn recent_actions(
    &self,
    entity_id: Uuid,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<WindowEntry>, Self::Error>> + Send + '_;

  /// Active joins at or after `since`, as window entries keyed by user id.
  fn recent_joins(
    &self,
    entity_id: Uuid,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<WindowEntry>, Self::Error>> + Send + '_;

  // ── Per-user reads ────────────────────────────────────────────────────

  fn users_with_actions(
    &self,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Active memberships of a user.
  fn user_memberships(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Membership>, Self::Error>> + Send + '_;

  fn user_bucket_counts(
    &self,
    user_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<UserBucketCount>, Self::Error>> + Send + '_;
}

// ─── SummaryStore ────────────────────────────────────────────────────────────

/// Durable aggregates written by the engine.
///
/// Summary writes are compare-and-swap on the row version. A stale version
/// yields [`WriteOutcome::Conflict`]; the store never overwrites blindly.
pub trait SummaryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Summaries ─────────────────────────────────────────────────────────

  fn get_summary(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Summary>, Self::Error>> + Send + '_;

  fn list_summaries(
    &self,
  ) -> impl Future<Output = Result<Vec<Summary>, Self::Error>> + Send + '_;

  /// Write `draft` if the stored version equals `expected_version` (0 for
  /// "no row yet"). On success the new row carries `expected_version + 1`.
  fn write_summary(
    &self,
    draft: SummaryDraft,
    expected_version: u64,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  // ── Trending snapshots ────────────────────────────────────────────────

  fn insert_snapshot(
    &self,
    snapshot: TrendingSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The snapshots written by the most recent trending run, if that run
  /// was at or after `since`. Optionally restricted to one group; ordered
  /// by rank score descending then entity id ascending. An entity left out
  /// of the latest run is absent even if an older run ranked it.
  fn latest_snapshots(
    &self,
    group_id: Option<Uuid>,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<TrendingSnapshot>, Self::Error>> + Send + '_;

  fn latest_snapshot(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<TrendingSnapshot>, Self::Error>> + Send + '_;

  /// Delete snapshots calculated before `before`; returns how many.
  fn prune_snapshots(
    &self,
    before: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Impact ────────────────────────────────────────────────────────────

  fn upsert_impact_index(
    &self,
    index: ImpactIndex,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_impact_index(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<ImpactIndex>, Self::Error>> + Send + '_;

  fn upsert_user_impact(
    &self,
    impact: UserImpact,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_user_impact(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<UserImpact>, Self::Error>> + Send + '_;
}
