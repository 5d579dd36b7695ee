//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rippl_core::{
  aggregate::{GroupImpact, ImpactIndex, SummaryDraft, TrendingSnapshot, UserImpact, WriteOutcome},
  catalog::{Entity, EntityStatus, Group, NewAction},
  store::{ActivityLog, SummaryStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() }

fn group() -> Group {
  Group {
    group_id:           Uuid::new_v4(),
    name:               "Environment".into(),
    impact_coefficient: 0.5,
    impact_unit:        "kg litter".into(),
    impact_source:      "field survey".into(),
    bucket_weights:     BTreeMap::from([
      ("pick_up_litter".to_owned(), 1.0),
      ("bring_reusable".to_owned(), 0.5),
    ]),
  }
}

async fn seeded() -> (SqliteStore, Group, Entity) {
  let s = store().await;
  let g = s.put_group(group()).await.unwrap();
  let e = s
    .put_entity(Entity {
      entity_id:      Uuid::new_v4(),
      group_id:       g.group_id,
      title:          "Litter Free Fridays".into(),
      status:         EntityStatus::Active,
      default_bucket: "pick_up_litter".into(),
    })
    .await
    .unwrap();
  (s, g, e)
}

async fn act(s: &SqliteStore, entity: &Entity, user: Uuid, bucket: &str, at: DateTime<Utc>) {
  s.record_action(NewAction {
    entity_id:   entity.entity_id,
    user_id:     user,
    bucket:      Some(bucket.into()),
    occurred_at: Some(at),
  })
  .await
  .unwrap();
}

// ─── Catalogue ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn group_roundtrips_with_weights() {
  let s = store().await;
  let g = s.put_group(group()).await.unwrap();
  let fetched = s.get_group(g.group_id).await.unwrap().unwrap();
  assert_eq!(fetched, g);
  assert_eq!(fetched.bucket_weight("bring_reusable"), Some(0.5));
}

#[tokio::test]
async fn put_group_replaces_in_place() {
  let (s, mut g, _) = seeded().await;
  g.impact_coefficient = -0.006;
  s.put_group(g.clone()).await.unwrap();
  assert_eq!(s.list_groups().await.unwrap(), vec![g]);
}

#[tokio::test]
async fn entity_requires_existing_group() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s
    .put_entity(Entity {
      entity_id:      Uuid::new_v4(),
      group_id:       missing,
      title:          "Orphan".into(),
      status:         EntityStatus::Active,
      default_bucket: "x".into(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::GroupNotFound(id) if id == missing));
}

#[tokio::test]
async fn list_entities_filters_by_status() {
  let (s, g, e) = seeded().await;
  s.put_entity(Entity {
    entity_id:      Uuid::new_v4(),
    group_id:       g.group_id,
    title:          "Old".into(),
    status:         EntityStatus::Archived,
    default_bucket: "pick_up_litter".into(),
  })
  .await
  .unwrap();

  assert_eq!(s.list_entities(None).await.unwrap().len(), 2);
  let active = s.list_entities(Some(EntityStatus::Active)).await.unwrap();
  assert_eq!(active, vec![e]);
}

// ─── Actions & memberships ───────────────────────────────────────────────────

#[tokio::test]
async fn record_action_defaults_bucket_and_group() {
  let (s, g, e) = seeded().await;
  let event = s
    .record_action(NewAction {
      entity_id:   e.entity_id,
      user_id:     Uuid::new_v4(),
      bucket:      None,
      occurred_at: Some(t0()),
    })
    .await
    .unwrap();
  assert_eq!(event.bucket, "pick_up_litter");
  assert_eq!(event.group_id, g.group_id);
  assert_eq!(event.occurred_at, t0());
}

#[tokio::test]
async fn record_action_for_unknown_entity_fails() {
  let s = store().await;
  let err = s
    .record_action(NewAction {
      entity_id:   Uuid::new_v4(),
      user_id:     Uuid::new_v4(),
      bucket:      None,
      occurred_at: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::EntityNotFound(_)));
}

#[tokio::test]
async fn counts_respect_since() {
  let (s, _, e) = seeded().await;
  let user = Uuid::new_v4();
  act(&s, &e, user, "pick_up_litter", t0() - Duration::days(40)).await;
  act(&s, &e, user, "pick_up_litter", t0() - Duration::hours(2)).await;
  act(&s, &e, user, "bring_reusable", t0() - Duration::minutes(5)).await;

  assert_eq!(s.count_actions(e.entity_id, None).await.unwrap(), 3);
  let since = t0() - Duration::days(30);
  assert_eq!(s.count_actions(e.entity_id, Some(since)).await.unwrap(), 2);

  let buckets = s.bucket_counts(e.entity_id, None).await.unwrap();
  assert_eq!(buckets.len(), 2);
  assert_eq!(buckets[0].bucket, "bring_reusable");
  assert_eq!(buckets[1].count, 2);

  let hour = s
    .recent_actions(e.entity_id, t0() - Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(hour.len(), 1);
}

#[tokio::test]
async fn rejoin_is_idempotent_while_active() {
  let (s, _, e) = seeded().await;
  let user = Uuid::new_v4();
  let first = s.join(user, e.entity_id, t0()).await.unwrap();
  let again = s.join(user, e.entity_id, t0() + Duration::hours(1)).await.unwrap();
  assert_eq!(first.joined_at, again.joined_at);
  assert!(again.is_active);
  assert_eq!(s.count_participants(e.entity_id, None).await.unwrap(), 1);
}

#[tokio::test]
async fn leave_deactivates_and_rejoin_restarts_the_clock() {
  let (s, _, e) = seeded().await;
  let user = Uuid::new_v4();
  s.join(user, e.entity_id, t0()).await.unwrap();

  assert!(s.leave(user, e.entity_id).await.unwrap());
  assert!(!s.leave(user, e.entity_id).await.unwrap());
  assert!(!s.leave(Uuid::new_v4(), e.entity_id).await.unwrap());
  assert_eq!(s.count_participants(e.entity_id, None).await.unwrap(), 0);
  assert!(s.user_memberships(user).await.unwrap().is_empty());

  let back = s.join(user, e.entity_id, t0() + Duration::hours(2)).await.unwrap();
  assert_eq!(back.joined_at, t0() + Duration::hours(2));
  assert_eq!(s.count_participants(e.entity_id, None).await.unwrap(), 1);
}

#[tokio::test]
async fn participants_and_join_window() {
  let (s, _, e) = seeded().await;
  for hours_ago in [48, 30, 3, 1] {
    s.join(Uuid::new_v4(), e.entity_id, t0() - Duration::hours(hours_ago))
      .await
      .unwrap();
  }
  let day_ago = t0() - Duration::hours(24);
  assert_eq!(s.count_participants(e.entity_id, None).await.unwrap(), 4);
  assert_eq!(s.count_participants(e.entity_id, Some(day_ago)).await.unwrap(), 2);
  assert_eq!(s.recent_joins(e.entity_id, day_ago).await.unwrap().len(), 2);
}

#[tokio::test]
async fn user_reads() {
  let (s, _, e) = seeded().await;
  let user = Uuid::new_v4();
  s.join(user, e.entity_id, t0()).await.unwrap();
  act(&s, &e, user, "pick_up_litter", t0()).await;
  act(&s, &e, user, "pick_up_litter", t0()).await;

  assert_eq!(s.users_with_actions().await.unwrap(), vec![user]);
  assert_eq!(s.user_memberships(user).await.unwrap().len(), 1);
  let counts = s.user_bucket_counts(user, None).await.unwrap();
  assert_eq!(counts.len(), 1);
  assert_eq!(counts[0].count, 2);
  assert_eq!(counts[0].group_id, e.group_id);
}

// ─── Summaries ───────────────────────────────────────────────────────────────

fn draft(entity_id: Uuid, participants: u64) -> SummaryDraft {
  SummaryDraft {
    participants,
    ..SummaryDraft::from_current(entity_id, None)
  }
}

#[tokio::test]
async fn first_write_creates_version_one() {
  let s = store().await;
  let id = Uuid::new_v4();
  let outcome = s.write_summary(draft(id, 3), 0).await.unwrap();
  let WriteOutcome::Committed(summary) = outcome else {
    panic!("expected commit");
  };
  assert_eq!(summary.version, 1);
  assert_eq!(s.get_summary(id).await.unwrap().unwrap().participants, 3);
}

#[tokio::test]
async fn stale_version_conflicts() {
  let s = store().await;
  let id = Uuid::new_v4();
  s.write_summary(draft(id, 1), 0).await.unwrap();

  // Two writers both read version 1; exactly one commits.
  let a = s.write_summary(draft(id, 10), 1).await.unwrap();
  let b = s.write_summary(draft(id, 20), 1).await.unwrap();
  assert!(matches!(a, WriteOutcome::Committed(ref s) if s.version == 2));
  assert_eq!(b, WriteOutcome::Conflict);

  let stored = s.get_summary(id).await.unwrap().unwrap();
  assert_eq!(stored.participants, 10);
  assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn insert_over_existing_row_conflicts() {
  let s = store().await;
  let id = Uuid::new_v4();
  s.write_summary(draft(id, 1), 0).await.unwrap();
  assert_eq!(s.write_summary(draft(id, 2), 0).await.unwrap(), WriteOutcome::Conflict);
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

fn snapshot(entity_id: Uuid, group_id: Uuid, rank: f64, at: DateTime<Utc>) -> TrendingSnapshot {
  TrendingSnapshot {
    entity_id,
    group_id,
    score: rank,
    rank_score: rank,
    participants: 10,
    actions_24h: 5,
    actions_1h: 1,
    new_participants_24h: 0,
    boost: 0.0,
    is_top_ten: false,
    top_ten_days: 0,
    calculated_at: at,
  }
}

#[tokio::test]
async fn latest_snapshots_come_from_the_newest_run() {
  let s = store().await;
  let (g, other) = (Uuid::new_v4(), Uuid::new_v4());
  let (a, b, gone) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let earlier = t0() - Duration::minutes(20);
  let run = t0() - Duration::minutes(10);
  s.insert_snapshot(snapshot(a, g, 90.0, earlier)).await.unwrap();
  s.insert_snapshot(snapshot(gone, g, 80.0, earlier)).await.unwrap();
  s.insert_snapshot(snapshot(a, g, 10.0, run)).await.unwrap();
  s.insert_snapshot(snapshot(b, g, 40.0, run)).await.unwrap();
  s.insert_snapshot(snapshot(Uuid::new_v4(), other, 99.0, run)).await.unwrap();

  let latest = s
    .latest_snapshots(Some(g), t0() - Duration::hours(1))
    .await
    .unwrap();
  let ids: Vec<_> = latest.iter().map(|s| (s.entity_id, s.rank_score)).collect();
  // `gone` was left out of the newest run.
  assert_eq!(ids, vec![(b, 40.0), (a, 10.0)]);

  assert_eq!(s.latest_snapshots(None, t0() - Duration::hours(1)).await.unwrap().len(), 3);
  assert!(s.latest_snapshots(Some(g), t0()).await.unwrap().is_empty());
  assert_eq!(s.latest_snapshot(a).await.unwrap().unwrap().rank_score, 10.0);
  assert_eq!(s.latest_snapshot(gone).await.unwrap().unwrap().rank_score, 80.0);
}

#[tokio::test]
async fn prune_drops_old_snapshots() {
  let s = store().await;
  let (e, g) = (Uuid::new_v4(), Uuid::new_v4());
  s.insert_snapshot(snapshot(e, g, 1.0, t0() - Duration::days(8))).await.unwrap();
  s.insert_snapshot(snapshot(e, g, 2.0, t0())).await.unwrap();
  assert_eq!(s.prune_snapshots(t0() - Duration::days(7)).await.unwrap(), 1);
  assert_eq!(s.latest_snapshot(e).await.unwrap().unwrap().score, 2.0);
}

// ─── Impact ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn impact_index_upserts() {
  let s = store().await;
  let mut index = ImpactIndex {
    entity_id:         Uuid::new_v4(),
    group_id:          Uuid::new_v4(),
    index_score:       1.25,
    median_impact:     10.0,
    ripple_impact:     12.5,
    participant_count: 10,
    eligible_actions:  25.0,
    is_visible:        true,
    calculated_at:     t0(),
  };
  s.upsert_impact_index(index.clone()).await.unwrap();
  index.is_visible = false;
  s.upsert_impact_index(index.clone()).await.unwrap();
  assert_eq!(s.get_impact_index(index.entity_id).await.unwrap(), Some(index));
}

#[tokio::test]
async fn user_impact_roundtrips_breakdowns() {
  let s = store().await;
  let g = GroupImpact {
    group_id: Uuid::new_v4(),
    actions:  4,
    eligible: 3.0,
    impact:   -0.018,
    unit:     "points".into(),
  };
  let impact = UserImpact {
    user_id:          Uuid::new_v4(),
    total_actions:    4,
    eligible_actions: 3.0,
    entities_joined:  1,
    lifetime:         vec![g.clone()],
    window_30d:       vec![g],
    calculated_at:    t0(),
  };
  s.upsert_user_impact(impact.clone()).await.unwrap();
  assert_eq!(s.get_user_impact(impact.user_id).await.unwrap(), Some(impact));
  assert!(s.get_user_impact(Uuid::new_v4()).await.unwrap().is_none());
}
