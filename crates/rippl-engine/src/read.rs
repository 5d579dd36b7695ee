//! Read paths behind the public endpoints.
//!
//! Trending reads prefer the live leaderboard and fall back to the latest
//! run's snapshots, rechecked against the log. Impact values are always
//! surfaced as absolute numbers.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rippl_core::{
  aggregate::TrendingSnapshot,
  catalog::EntityStatus,
  counters::{self, EntityCounters},
  keys,
  store::{ActivityLog, CounterStore, SummaryStore},
};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{EngineError, Result, config::EngineConfig};

pub const MAX_TRENDING_LIMIT: usize = 50;

/// How far back the snapshot fallback looks.
const SNAPSHOT_FALLBACK_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingEntry {
  /// 1-based.
  pub rank:       usize,
  pub entity_id:  Uuid,
  pub rank_score: f64,
  pub snapshot:   Option<TrendingSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactCard {
  pub entity_id:        Uuid,
  pub lifetime_value:   f64,
  pub window_30d_value: f64,
  pub unit:             String,
  /// Where the group's coefficient comes from. Empty if the group is gone.
  pub impact_source:    String,
  /// Only present once the index passes its visibility gate.
  pub index:            Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserImpactView {
  pub user_id:           Uuid,
  /// The user's most active group over the last 30 days.
  pub group_id:          Option<Uuid>,
  pub value:             f64,
  pub unit:              String,
  pub actions_in_window: u64,
  pub total_actions:     u64,
  pub entities_joined:   u64,
}

/// Everything the engine knows about one entity's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDebug {
  pub entity_id:      Uuid,
  pub fields:         BTreeMap<String, f64>,
  pub decayed_boost:  f64,
  pub last_boost_ts:  Option<DateTime<Utc>>,
  pub global_rank:    Option<usize>,
  pub global_score:   Option<f64>,
  pub actions_window: u64,
  pub joins_window:   u64,
}

pub struct ReadService<C, L, S> {
  counters:  Arc<C>,
  log:       Arc<L>,
  summaries: Arc<S>,
  config:    Arc<EngineConfig>,
}

impl<C, L, S> ReadService<C, L, S>
where
  C: CounterStore,
  L: ActivityLog,
  S: SummaryStore,
{
  pub fn new(
    counters: Arc<C>,
    log: Arc<L>,
    summaries: Arc<S>,
    config: Arc<EngineConfig>,
  ) -> Self {
    Self { counters, log, summaries, config }
  }

  // ── Trending ──────────────────────────────────────────────────────────────

  pub async fn top_trending(&self, group_id: Option<Uuid>, limit: usize) -> Vec<TrendingEntry> {
    self.top_trending_at(group_id, limit, Utc::now()).await
  }

  /// Never fails: store errors are logged and yield an empty list.
  pub async fn top_trending_at(
    &self,
    group_id: Option<Uuid>,
    limit: usize,
    now: DateTime<Utc>,
  ) -> Vec<TrendingEntry> {
    let limit = limit.clamp(1, MAX_TRENDING_LIMIT);
    match self.from_leaderboard(group_id, limit).await {
      Ok(entries) if !entries.is_empty() => return entries,
      Ok(_) => debug!(?group_id, "leaderboard empty; reading snapshots"),
      Err(e) => warn!(?group_id, error = %e, "leaderboard read failed; reading snapshots"),
    }
    match self.from_snapshots(group_id, limit, now).await {
      Ok(entries) => entries,
      Err(e) => {
        warn!(?group_id, error = %e, "snapshot fallback failed");
        Vec::new()
      }
    }
  }

  async fn from_leaderboard(
    &self,
    group_id: Option<Uuid>,
    limit: usize,
  ) -> Result<Vec<TrendingEntry>> {
    let rows = self
      .counters
      .rank_top(&keys::leaderboard(group_id), limit)
      .await
      .map_err(EngineError::counter)?;

    let mut out = Vec::with_capacity(rows.len());
    for (member, rank_score) in rows {
      let Ok(entity_id) = member.parse::<Uuid>() else {
        warn!(member, "non-uuid leaderboard member ignored");
        continue;
      };
      let snapshot = match self.summaries.latest_snapshot(entity_id).await {
        Ok(s) => s,
        Err(e) => {
          warn!(%entity_id, error = %e, "snapshot lookup failed");
          None
        }
      };
      out.push(TrendingEntry { rank: out.len() + 1, entity_id, rank_score, snapshot });
    }
    Ok(out)
  }

  async fn from_snapshots(
    &self,
    group_id: Option<Uuid>,
    limit: usize,
    now: DateTime<Utc>,
  ) -> Result<Vec<TrendingEntry>> {
    let snapshots = self
      .summaries
      .latest_snapshots(group_id, now - Duration::seconds(SNAPSHOT_FALLBACK_SECS))
      .await
      .map_err(EngineError::summary)?;

    let mut out = Vec::with_capacity(limit);
    for s in snapshots.into_iter().filter(|s| s.rank_score > 0.0) {
      if out.len() == limit {
        break;
      }
      if !self.still_eligible(s.entity_id).await? {
        debug!(entity_id = %s.entity_id, "snapshot of ineligible entity dropped");
        continue;
      }
      out.push(TrendingEntry {
        rank:       out.len() + 1,
        entity_id:  s.entity_id,
        rank_score: s.rank_score,
        snapshot:   Some(s),
      });
    }
    Ok(out)
  }

  /// Active, and at or above the participant guardrail right now.
  async fn still_eligible(&self, entity_id: Uuid) -> Result<bool> {
    let active = self
      .log
      .get_entity(entity_id)
      .await
      .map_err(EngineError::log)?
      .is_some_and(|e| e.status == EntityStatus::Active);
    if !active {
      return Ok(false);
    }
    let participants = self
      .log
      .count_participants(entity_id, None)
      .await
      .map_err(EngineError::log)?;
    Ok(participants >= self.config.trending.min_participants)
  }

  // ── Impact ────────────────────────────────────────────────────────────────

  /// `None` when there is no summary yet or the read failed.
  pub async fn impact_card(&self, entity_id: Uuid) -> Option<ImpactCard> {
    match self.load_impact_card(entity_id).await {
      Ok(card) => card,
      Err(e) => {
        warn!(%entity_id, error = %e, "impact card read failed");
        None
      }
    }
  }

  async fn load_impact_card(&self, entity_id: Uuid) -> Result<Option<ImpactCard>> {
    let Some(summary) = self
      .summaries
      .get_summary(entity_id)
      .await
      .map_err(EngineError::summary)?
    else {
      return Ok(None);
    };
    let index = self
      .summaries
      .get_impact_index(entity_id)
      .await
      .map_err(EngineError::summary)?
      .filter(|i| i.is_visible)
      .map(|i| i.index_score);

    let group = match self.log.get_entity(entity_id).await.map_err(EngineError::log)? {
      Some(entity) => self
        .log
        .get_group(entity.group_id)
        .await
        .map_err(EngineError::log)?,
      None => None,
    };

    Ok(Some(ImpactCard {
      entity_id,
      lifetime_value: summary.impact_lifetime.abs(),
      window_30d_value: summary.impact_30d.abs(),
      unit: summary.impact_unit,
      impact_source: group.map(|g| g.impact_source).unwrap_or_default(),
      index,
    }))
  }

  pub async fn user_impact(&self, user_id: Uuid) -> Option<UserImpactView> {
    let impact = match self.summaries.get_user_impact(user_id).await {
      Ok(impact) => impact?,
      Err(e) => {
        warn!(%user_id, error = %e, "user impact read failed");
        return None;
      }
    };

    let view = match impact.primary_group() {
      Some(g) => UserImpactView {
        user_id,
        group_id: Some(g.group_id),
        value: g.impact.abs(),
        unit: g.unit.clone(),
        actions_in_window: g.actions,
        total_actions: impact.total_actions,
        entities_joined: impact.entities_joined,
      },
      None => UserImpactView {
        user_id,
        group_id: None,
        value: 0.0,
        unit: String::new(),
        actions_in_window: 0,
        total_actions: impact.total_actions,
        entities_joined: impact.entities_joined,
      },
    };
    Some(view)
  }

  // ── Debug ─────────────────────────────────────────────────────────────────

  pub async fn signal_debug(&self, entity_id: Uuid) -> Result<SignalDebug> {
    self.signal_debug_at(entity_id, Utc::now()).await
  }

  pub async fn signal_debug_at(&self, entity_id: Uuid, now: DateTime<Utc>) -> Result<SignalDebug> {
    let c = &*self.counters;
    let raw = c
      .get_all(&keys::entity(entity_id))
      .await
      .map_err(EngineError::counter)?;
    let parsed = EntityCounters::from_fields(&raw)?;
    let decayed_boost = parsed.boost_at(now, self.config.trending.boost_half_life_secs);

    let member = entity_id.to_string();
    let global_score = c
      .rank_score(keys::GLOBAL_LEADERBOARD, &member)
      .await
      .map_err(EngineError::counter)?;
    let global_rank = match global_score {
      Some(score) => {
        let board = c
          .rank_top(keys::GLOBAL_LEADERBOARD, usize::MAX)
          .await
          .map_err(EngineError::counter)?;
        board
          .iter()
          .position(|(m, s)| *m == member && *s == score)
          .map(|p| p + 1)
      }
      None => None,
    };

    let since = counters::encode_ts(now - Duration::seconds(self.config.trending.window_secs));
    let actions_window = c
      .rank_count(&keys::action_window(entity_id), since, f64::MAX)
      .await
      .map_err(EngineError::counter)?;
    let joins_window = c
      .rank_count(&keys::join_window(entity_id), since, f64::MAX)
      .await
      .map_err(EngineError::counter)?;

    Ok(SignalDebug {
      entity_id,
      fields: raw.into_iter().collect(),
      decayed_boost,
      last_boost_ts: parsed.last_boost_ts,
      global_rank,
      global_score,
      actions_window,
      joins_window,
    })
  }
}

#[cfg(test)]
mod tests {
  use rippl_core::aggregate::{GroupImpact, UserImpact};

  use super::*;
  use crate::testing::{Fixture, t0};

  type Reads = ReadService<
    rippl_counters::MemoryCounterStore,
    rippl_store_sqlite::SqliteStore,
    rippl_store_sqlite::SqliteStore,
  >;

  fn service(fx: &Fixture) -> Reads {
    ReadService::new(
      fx.counters.clone(),
      fx.log.clone(),
      fx.summaries.clone(),
      fx.config.clone(),
    )
  }

  #[tokio::test]
  async fn trending_reads_the_leaderboard_after_a_cycle() {
    let fx = Fixture::new().await;
    let recent = t0() - Duration::minutes(30);
    let (busy, _) = fx.entity_with(40, 60, recent).await;
    let (calm, _) = fx.entity_with(20, 5, recent).await;
    fx.trending().run_cycle_at(t0()).await.unwrap();

    let top = service(&fx).top_trending_at(None, 10, t0()).await;
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].entity_id, busy.entity_id);
    assert_eq!(top[0].rank, 1);
    assert_eq!(top[1].entity_id, calm.entity_id);
    assert!(top[0].snapshot.as_ref().is_some_and(|s| s.participants == 40));

    let by_group = service(&fx).top_trending_at(Some(fx.group.group_id), 1, t0()).await;
    assert_eq!(by_group.len(), 1);
    assert_eq!(by_group[0].entity_id, busy.entity_id);
  }

  #[tokio::test]
  async fn trending_falls_back_to_recent_snapshots() {
    let fx = Fixture::new().await;
    let (entity, _) = fx.entity_with(10, 3, t0()).await;
    fx.trending().run_cycle_at(t0()).await.unwrap();
    fx.counters.delete(keys::GLOBAL_LEADERBOARD).await.unwrap();

    let top = service(&fx).top_trending_at(None, 10, t0()).await;
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].entity_id, entity.entity_id);

    // Snapshots older than the fallback window are not used.
    let later = t0() + Duration::hours(2);
    assert!(service(&fx).top_trending_at(None, 10, later).await.is_empty());
  }

  #[tokio::test]
  async fn fallback_drops_entities_that_lost_eligibility() {
    let fx = Fixture::new().await;
    let recent = t0() - Duration::minutes(30);
    let (leaving, members) = fx.entity_with(8, 40, recent).await;
    let (steady, _) = fx.entity_with(9, 2, recent).await;
    let (mut archived, _) = fx.entity_with(10, 30, recent).await;
    fx.trending().run_cycle_at(t0()).await.unwrap();

    // One member leaves and an entity is archived; the next run ranks
    // neither, and the boards are lost before anyone reads them.
    assert!(fx.log.leave(members[0], leaving.entity_id).await.unwrap());
    archived.status = EntityStatus::Archived;
    fx.log.put_entity(archived.clone()).await.unwrap();
    let next = t0() + Duration::minutes(10);
    fx.trending().run_cycle_at(next).await.unwrap();
    fx.counters.delete(keys::GLOBAL_LEADERBOARD).await.unwrap();

    let top = service(&fx).top_trending_at(None, 10, next).await;
    let ids: Vec<_> = top.iter().map(|e| e.entity_id).collect();
    assert_eq!(ids, vec![steady.entity_id]);
    assert!(top.iter().all(|e| e.snapshot.as_ref().is_some_and(|s| s.participants >= 8)));
  }

  #[tokio::test]
  async fn fallback_rechecks_when_the_last_run_ranked_nothing() {
    let fx = Fixture::new().await;
    let (entity, members) = fx.entity_with(8, 5, t0()).await;
    fx.trending().run_cycle_at(t0()).await.unwrap();
    fx.log.leave(members[0], entity.entity_id).await.unwrap();
    fx.trending().run_cycle_at(t0() + Duration::minutes(10)).await.unwrap();

    assert!(fx.counters.rank_top(keys::GLOBAL_LEADERBOARD, 10).await.unwrap().is_empty());
    let top = service(&fx).top_trending_at(None, 10, t0() + Duration::minutes(10)).await;
    assert!(top.is_empty());
  }

  #[tokio::test]
  async fn trending_limit_is_clamped() {
    let fx = Fixture::new().await;
    for _ in 0..3 {
      fx.entity_with(10, 1, t0()).await;
    }
    fx.trending().run_cycle_at(t0()).await.unwrap();
    assert_eq!(service(&fx).top_trending_at(None, 0, t0()).await.len(), 1);
    assert_eq!(service(&fx).top_trending_at(None, 500, t0()).await.len(), 3);
  }

  #[tokio::test]
  async fn impact_card_hides_index_until_visible() {
    let fx = Fixture::with_coefficient(-0.2).await;
    let (small, _) = fx.entity_with(2, 5, t0()).await;
    let (big, _) = fx.entity_with(10, 30, t0()).await;
    fx.impact().run_cycle_at(t0()).await.unwrap();
    let reads = service(&fx);

    let card = reads.impact_card(small.entity_id).await.unwrap();
    assert_eq!(card.lifetime_value, 1.0);
    assert_eq!(card.impact_source, "field survey");
    assert!(card.index.is_none());

    let card = reads.impact_card(big.entity_id).await.unwrap();
    assert_eq!(card.window_30d_value, 6.0);
    // Median of 1.0 and 6.0.
    assert!(card.index.is_some_and(|i| (i - 6.0 / 3.5).abs() < 1e-9));

    assert!(reads.impact_card(Uuid::new_v4()).await.is_none());
  }

  #[tokio::test]
  async fn user_view_uses_primary_group() {
    let fx = Fixture::new().await;
    let user = Uuid::new_v4();
    let (quiet, busy) = (Uuid::new_v4(), Uuid::new_v4());
    let group = |group_id, actions: u64| GroupImpact {
      group_id,
      actions,
      eligible: actions as f64,
      impact: actions as f64 * -0.5,
      unit: "kg".into(),
    };
    fx.summaries
      .upsert_user_impact(UserImpact {
        user_id:          user,
        total_actions:    12,
        eligible_actions: 12.0,
        entities_joined:  2,
        lifetime:         vec![group(quiet, 4), group(busy, 8)],
        window_30d:       vec![group(quiet, 1), group(busy, 3)],
        calculated_at:    t0(),
      })
      .await
      .unwrap();

    let view = service(&fx).user_impact(user).await.unwrap();
    assert_eq!(view.group_id, Some(busy));
    assert_eq!(view.value, 1.5);
    assert_eq!(view.actions_in_window, 3);
    assert!(service(&fx).user_impact(Uuid::new_v4()).await.is_none());
  }

  #[tokio::test]
  async fn signal_debug_reports_rank_and_windows() {
    let fx = Fixture::new().await;
    let recent = t0() - Duration::minutes(5);
    let (entity, _) = fx.entity_with(12, 4, recent).await;
    fx.trending().run_cycle_at(t0()).await.unwrap();

    let debug = service(&fx).signal_debug_at(entity.entity_id, t0()).await.unwrap();
    assert_eq!(debug.global_rank, Some(1));
    assert!(debug.global_score.is_some_and(|s| s > 0.0));
    assert_eq!(debug.actions_window, 4);
    assert_eq!(debug.joins_window, 12);
    assert_eq!(debug.fields.get(counters::PARTICIPANTS_TOTAL), Some(&12.0));

    let empty = service(&fx).signal_debug_at(Uuid::new_v4(), t0()).await.unwrap();
    assert!(empty.fields.is_empty());
    assert_eq!(empty.global_rank, None);
  }
}
