//! Trending scores, leaderboards, and the hourly counter decay.
//!
//! A cycle is two phases. [`TrendingEngine::reconcile`] brings every active
//! entity's counter hash back in line with the activity log and yields a
//! batch of [`EntitySignals`]; [`compute_batch`] then scores and ranks the
//! whole batch before anything is written.

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
  time::Instant,
};

use chrono::{DateTime, Duration, Utc};
use rippl_core::{
  aggregate::{SummaryDraft, TrendingSnapshot},
  catalog::{Entity, EntityStatus},
  counters::{self, EntityCounters},
  keys,
  store::{ActivityLog, CounterStore, SummaryStore},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  EngineError, Result,
  config::{EngineConfig, ScoreWeights, TrendingConfig},
  job::{CycleReport, JobKind},
  retry::{self, RetryOutcome},
};

// ─── Signals & scoring ───────────────────────────────────────────────────────

/// Reconciled inputs to the score of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySignals {
  pub entity_id:            Uuid,
  pub group_id:             Uuid,
  pub participants_total:   u64,
  pub actions_24h:          u64,
  pub actions_1h:           u64,
  pub new_participants_24h: u64,
  /// Boost already decayed to the cycle's `now`.
  pub boost:                f64,
  pub top_ten_since:        Option<DateTime<Utc>>,
}

/// The raw trending score, floored at zero.
pub fn compute_score(s: &EntitySignals, w: &ScoreWeights) -> f64 {
  let score = w.participants * (s.participants_total as f64 + 1.0).log10()
    + w.actions_24h * (s.actions_24h as f64).ln_1p()
    + w.actions_1h * (s.actions_1h as f64).ln_1p()
    + w.new_participants * s.new_participants_24h as f64
    + w.boost * s.boost;
  if score.is_finite() { score.max(0.0) } else { 0.0 }
}

/// Whole days an entity has held a top-N position.
fn days_held(since: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
  u32::try_from((now - since).num_days().max(0)).unwrap_or(u32::MAX)
}

/// Score, rank, and flag a batch of signals.
///
/// Entities under the participant guardrail are dropped, not zero-scored.
/// The result is ordered by rank score descending, then entity id.
pub fn compute_batch(
  signals: &[EntitySignals],
  config: &TrendingConfig,
  now: DateTime<Utc>,
) -> Vec<TrendingSnapshot> {
  let cool_off = Duration::days(config.cool_off_days);

  let mut scored: Vec<TrendingSnapshot> = signals
    .iter()
    .filter(|s| s.participants_total >= config.min_participants)
    .map(|s| {
      let score = compute_score(s, &config.weights);
      let cooled = s.top_ten_since.is_some_and(|since| now - since > cool_off);
      let rank_score = if cooled { score * config.cool_off_factor } else { score };
      TrendingSnapshot {
        entity_id: s.entity_id,
        group_id: s.group_id,
        score,
        rank_score,
        participants: s.participants_total,
        actions_24h: s.actions_24h,
        actions_1h: s.actions_1h,
        new_participants_24h: s.new_participants_24h,
        boost: s.boost,
        is_top_ten: false,
        top_ten_days: 0,
        calculated_at: now,
      }
    })
    .collect();

  scored.sort_by(|a, b| {
    b.rank_score
      .total_cmp(&a.rank_score)
      .then_with(|| a.entity_id.cmp(&b.entity_id))
  });

  let Some(cutoff) = scored
    .get(config.top_n.saturating_sub(1))
    .or_else(|| scored.last())
    .map(|s| s.rank_score)
  else {
    return scored;
  };
  let threshold = cutoff.max(config.top_score_floor);

  for (position, snapshot) in scored.iter_mut().enumerate() {
    if position < config.top_n && snapshot.rank_score >= threshold {
      snapshot.is_top_ten = true;
      snapshot.top_ten_days = signals
        .iter()
        .find(|s| s.entity_id == snapshot.entity_id)
        .and_then(|s| s.top_ten_since)
        .map_or(0, |since| days_held(since, now));
    }
  }

  scored
}

// ─── Engine ──────────────────────────────────────────────────────────────────

fn ms(ts: DateTime<Utc>) -> f64 { counters::encode_ts(ts) }

pub struct TrendingEngine<C, L, S> {
  counters:  Arc<C>,
  log:       Arc<L>,
  summaries: Arc<S>,
  config:    Arc<EngineConfig>,
}

impl<C, L, S> TrendingEngine<C, L, S>
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

  fn cfg(&self) -> &TrendingConfig { &self.config.trending }

  pub async fn run_cycle(&self) -> Result<CycleReport> { self.run_cycle_at(Utc::now()).await }

  /// One full trending cycle as of `now`.
  pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
    let clock = Instant::now();
    let mut report = CycleReport::begin(JobKind::Trending, now);

    let entities = self
      .log
      .list_entities(Some(EntityStatus::Active))
      .await
      .map_err(EngineError::log)?;
    report.processed = entities.len();

    // Phase 1: reconcile.
    let mut signals = Vec::with_capacity(entities.len());
    for entity in &entities {
      match self.reconcile(entity, now).await {
        Ok(s) => signals.push(s),
        Err(e) if e.is_invariant() => {
          error!(entity_id = %entity.entity_id, error = %e, "skipping entity");
          report.skipped += 1;
        }
        Err(e) => {
          warn!(entity_id = %entity.entity_id, error = %e, "reconcile failed");
          report.failed += 1;
        }
      }
    }

    // Phase 2: score the whole batch before writing anything.
    let batch = compute_batch(&signals, self.cfg(), now);
    report.skipped += signals.len() - batch.len();

    for snapshot in &batch {
      match self.summaries.insert_snapshot(snapshot.clone()).await {
        Ok(()) => report.succeeded += 1,
        Err(e) => {
          warn!(entity_id = %snapshot.entity_id, error = %e, "snapshot write failed");
          report.failed += 1;
        }
      }
    }

    let mut groups: BTreeSet<Uuid> = entities.iter().map(|e| e.group_id).collect();
    match self.log.list_groups().await {
      Ok(all) => groups.extend(all.into_iter().map(|g| g.group_id)),
      Err(e) => warn!(error = %e, "could not list groups; stale group boards may linger"),
    }
    if let Err(e) = self.rebuild_leaderboards(&batch, &groups).await {
      warn!(error = %e, "leaderboard rebuild failed");
    }
    self.track_top_ten(&signals, &batch, now).await;

    for entity in &entities {
      if let Err(e) = self.prune_windows(entity.entity_id, now).await {
        warn!(entity_id = %entity.entity_id, error = %e, "window prune failed");
      }
    }
    let retention = now - Duration::days(self.cfg().snapshot_retention_days);
    match self.summaries.prune_snapshots(retention).await {
      Ok(n) if n > 0 => debug!(pruned = n, "old snapshots pruned"),
      Ok(_) => {}
      Err(e) => warn!(error = %e, "snapshot prune failed"),
    }

    report.duration = clock.elapsed();
    info!(
      processed = report.processed,
      ranked = batch.len(),
      skipped = report.skipped,
      failed = report.failed,
      elapsed_ms = report.duration.as_millis() as u64,
      "trending cycle complete"
    );
    Ok(report)
  }

  // ── Reconcile ─────────────────────────────────────────────────────────────

  /// Bring one entity's counters in line with the activity log and return
  /// its signals. Also writes participant and action totals into the
  /// entity's summary.
  pub async fn reconcile(
    &self,
    entity: &Entity,
    now: DateTime<Utc>,
  ) -> Result<EntitySignals> {
    let id = entity.entity_id;
    let key = keys::entity(id);
    let day_ago = now - Duration::seconds(self.cfg().window_secs);
    let hour_ago = now - Duration::hours(1);

    let fields = self.counters.get_all(&key).await.map_err(EngineError::counter)?;
    let current = EntityCounters::from_fields(&fields)?;

    let participants_total = self
      .log
      .count_participants(id, None)
      .await
      .map_err(EngineError::log)?;
    let new_participants_24h = self
      .log
      .count_participants(id, Some(day_ago))
      .await
      .map_err(EngineError::log)?;
    let actions_total = self.log.count_actions(id, None).await.map_err(EngineError::log)?;
    let logged_24h = self
      .log
      .count_actions(id, Some(day_ago))
      .await
      .map_err(EngineError::log)?;

    // The windows may hold only what arrived since the counters were lost,
    // so anything short of the log is refilled from it.
    let window = keys::action_window(id);
    let mut actions_24h = self
      .counters
      .rank_count(&window, ms(day_ago), f64::MAX)
      .await
      .map_err(EngineError::counter)?;
    let joins_24h = self
      .counters
      .rank_count(&keys::join_window(id), ms(day_ago), f64::MAX)
      .await
      .map_err(EngineError::counter)?;
    if actions_24h < logged_24h || joins_24h < new_participants_24h {
      self.backfill(id, day_ago).await?;
      actions_24h = self
        .counters
        .rank_count(&window, ms(day_ago), f64::MAX)
        .await
        .map_err(EngineError::counter)?;
    }
    let actions_1h = self
      .counters
      .rank_count(&window, ms(hour_ago), f64::MAX)
      .await
      .map_err(EngineError::counter)?;

    for (field, value) in [
      (counters::PARTICIPANTS_TOTAL, participants_total),
      (counters::NEW_PARTICIPANTS_24H, new_participants_24h),
      (counters::ACTIONS_24H, actions_24h),
      (counters::ACTIONS_1H, actions_1h),
    ] {
      self
        .counters
        .set_field(&key, field, value as f64)
        .await
        .map_err(EngineError::counter)?;
    }
    self
      .counters
      .set_expiry(&key, self.cfg().counter_ttl())
      .await
      .map_err(EngineError::counter)?;

    let outcome = retry::update_summary(
      &*self.summaries,
      id,
      self.config.impact.max_write_attempts,
      |cur| SummaryDraft {
        participants: participants_total,
        actions_total,
        ..SummaryDraft::from_current(id, cur)
      },
    )
    .await?;
    if outcome == RetryOutcome::GaveUp {
      debug!(entity_id = %id, "summary totals left for the next cycle");
    }

    Ok(EntitySignals {
      entity_id: id,
      group_id: entity.group_id,
      participants_total,
      actions_24h,
      actions_1h,
      new_participants_24h,
      boost: current.boost_at(now, self.cfg().boost_half_life_secs),
      top_ten_since: current.top_ten_since,
    })
  }

  /// Refill the raw windows of an entity from the log. Members are keyed by
  /// action or user id, so entries already present are left as they are.
  async fn backfill(&self, entity_id: Uuid, since: DateTime<Utc>) -> Result<()> {
    let actions = self
      .log
      .recent_actions(entity_id, since)
      .await
      .map_err(EngineError::log)?;
    let joins = self
      .log
      .recent_joins(entity_id, since)
      .await
      .map_err(EngineError::log)?;
    debug!(%entity_id, actions = actions.len(), joins = joins.len(), "backfilling counters");

    let action_key = keys::action_window(entity_id);
    for entry in &actions {
      self
        .counters
        .rank_update(&action_key, &entry.id.to_string(), ms(entry.at))
        .await
        .map_err(EngineError::counter)?;
    }
    let join_key = keys::join_window(entity_id);
    for entry in &joins {
      self
        .counters
        .rank_update(&join_key, &entry.id.to_string(), ms(entry.at))
        .await
        .map_err(EngineError::counter)?;
    }
    Ok(())
  }

  // ── Leaderboards ──────────────────────────────────────────────────────────

  async fn rebuild_leaderboards(
    &self,
    batch: &[TrendingSnapshot],
    groups: &BTreeSet<Uuid>,
  ) -> Result<()> {
    let ttl = self.cfg().leaderboard_ttl();

    self
      .counters
      .delete(keys::GLOBAL_LEADERBOARD)
      .await
      .map_err(EngineError::counter)?;
    for group_id in groups {
      self
        .counters
        .delete(&keys::group_leaderboard(*group_id))
        .await
        .map_err(EngineError::counter)?;
    }

    let mut touched = BTreeSet::new();
    for snapshot in batch.iter().filter(|s| s.rank_score > 0.0) {
      let member = snapshot.entity_id.to_string();
      let group_key = keys::group_leaderboard(snapshot.group_id);
      for key in [keys::GLOBAL_LEADERBOARD, group_key.as_str()] {
        self
          .counters
          .rank_update(key, &member, snapshot.rank_score)
          .await
          .map_err(EngineError::counter)?;
      }
      touched.insert(group_key);
    }

    if !touched.is_empty() {
      touched.insert(keys::GLOBAL_LEADERBOARD.to_owned());
    }
    for key in &touched {
      self.counters.set_expiry(key, ttl).await.map_err(EngineError::counter)?;
    }
    Ok(())
  }

  /// Start the clock for entities entering the top N and clear it for those
  /// leaving. Failures are per entity.
  async fn track_top_ten(
    &self,
    signals: &[EntitySignals],
    batch: &[TrendingSnapshot],
    now: DateTime<Utc>,
  ) {
    let top: HashSet<Uuid> = batch
      .iter()
      .filter(|s| s.is_top_ten)
      .map(|s| s.entity_id)
      .collect();

    for s in signals {
      let key = keys::entity(s.entity_id);
      let result = match (top.contains(&s.entity_id), s.top_ten_since) {
        (true, None) => {
          self
            .counters
            .set_field(&key, counters::TOP_TEN_SINCE, ms(now))
            .await
        }
        (false, Some(_)) => self.counters.remove_field(&key, counters::TOP_TEN_SINCE).await,
        _ => Ok(()),
      };
      if let Err(e) = result {
        warn!(entity_id = %s.entity_id, error = %e, "top-ten tracking failed");
      }
    }
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn prune_windows(&self, entity_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    // Window scores are whole milliseconds; this keeps the cutoff itself.
    let cutoff = ms(now - Duration::seconds(self.cfg().window_secs)) - 1.0;
    for key in [keys::action_window(entity_id), keys::join_window(entity_id)] {
      self
        .counters
        .rank_prune(&key, cutoff)
        .await
        .map_err(EngineError::counter)?;
    }
    Ok(())
  }

  pub async fn run_decay(&self) -> Result<CycleReport> { self.run_decay_at(Utc::now()).await }

  /// Materialise boost decay, reset the hourly counter, prune windows,
  /// refresh expiries, then sweep expired keys.
  pub async fn run_decay_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
    let clock = Instant::now();
    let mut report = CycleReport::begin(JobKind::Decay, now);

    let entities = self.log.list_entities(None).await.map_err(EngineError::log)?;
    report.processed = entities.len();

    for entity in &entities {
      match self.decay_entity(entity.entity_id, now).await {
        Ok(true) => report.succeeded += 1,
        Ok(false) => report.skipped += 1,
        Err(e) if e.is_invariant() => {
          error!(entity_id = %entity.entity_id, error = %e, "skipping entity");
          report.skipped += 1;
        }
        Err(e) => {
          warn!(entity_id = %entity.entity_id, error = %e, "decay failed");
          report.failed += 1;
        }
      }
    }

    match self.counters.purge_expired().await {
      Ok(n) => debug!(purged = n, "expired counter keys purged"),
      Err(e) => warn!(error = %e, "counter purge failed"),
    }

    report.duration = clock.elapsed();
    info!(
      processed = report.processed,
      decayed = report.succeeded,
      failed = report.failed,
      "decay cycle complete"
    );
    Ok(report)
  }

  /// Returns `false` when the entity has no live counters.
  async fn decay_entity(&self, entity_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let key = keys::entity(entity_id);
    let fields = self.counters.get_all(&key).await.map_err(EngineError::counter)?;
    if fields.is_empty() {
      return Ok(false);
    }
    let current = EntityCounters::from_fields(&fields)?;

    let mut boost = current.boost_at(now, self.cfg().boost_half_life_secs);
    if boost < self.cfg().boost_floor {
      boost = 0.0;
    }
    // Applied as a delta: an ingest increment landing after the read above
    // is kept on top of the decayed value.
    self
      .counters
      .increment(&key, counters::BOOST, boost - current.boost)
      .await
      .map_err(EngineError::counter)?;
    for (field, value) in [(counters::LAST_BOOST_TS, ms(now)), (counters::ACTIONS_1H, 0.0)] {
      self
        .counters
        .set_field(&key, field, value)
        .await
        .map_err(EngineError::counter)?;
    }

    self.prune_windows(entity_id, now).await?;
    self
      .counters
      .set_expiry(&key, self.cfg().counter_ttl())
      .await
      .map_err(EngineError::counter)?;
    Ok(true)
  }
}
