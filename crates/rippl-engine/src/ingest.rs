//! Event-driven counter updates.
//!
//! The action-completion and onboarding flows call into [`IngestHook`] after
//! they have appended to the activity log. Each hook spawns its own task and
//! returns immediately; nothing it does can fail the caller. The counters it
//! bumps are an approximation that the next trending cycle reconciles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rippl_core::{
  catalog::ActionEvent,
  counters,
  keys,
  store::{ActivityLog, CounterStore, SummaryStore},
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  EngineError, Result,
  config::{EngineConfig, TrendingConfig},
  impact::ImpactEngine,
};

pub struct IngestHook<C, L, S> {
  counters: Arc<C>,
  impact:   Arc<ImpactEngine<L, S>>,
  config:   Arc<EngineConfig>,
}

impl<C, L, S> Clone for IngestHook<C, L, S> {
  fn clone(&self) -> Self {
    Self {
      counters: self.counters.clone(),
      impact:   self.impact.clone(),
      config:   self.config.clone(),
    }
  }
}

impl<C, L, S> IngestHook<C, L, S>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  pub fn new(
    counters: Arc<C>,
    impact: Arc<ImpactEngine<L, S>>,
    config: Arc<EngineConfig>,
  ) -> Self {
    Self { counters, impact, config }
  }

  fn cfg(&self) -> &TrendingConfig { &self.config.trending }

  /// Fire-and-forget: bump the entity's counters for one completed action,
  /// then refresh its impact after a short delay.
  pub fn on_action_completed(&self, event: ActionEvent) -> JoinHandle<()> {
    let hook = self.clone();
    tokio::spawn(async move {
      if let Err(e) = hook.apply_action(&event, Utc::now()).await {
        warn!(
          entity_id = %event.entity_id,
          action_id = %event.action_id,
          error = %e,
          "counter update for action failed"
        );
      }
      hook.deferred_refresh(event.entity_id).await;
    })
  }

  /// Fire-and-forget: count a new member, then refresh the entity's impact.
  pub fn on_member_joined(
    &self,
    entity_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> JoinHandle<()> {
    let hook = self.clone();
    tokio::spawn(async move {
      if let Err(e) = hook.apply_join(entity_id, user_id, joined_at).await {
        warn!(%entity_id, %user_id, error = %e, "counter update for join failed");
      }
      hook.deferred_refresh(entity_id).await;
    })
  }

  /// The counter writes behind [`Self::on_action_completed`]. Each write is
  /// atomic on its own; they are not applied as a unit.
  pub async fn apply_action(&self, event: &ActionEvent, now: DateTime<Utc>) -> Result<()> {
    let key = keys::entity(event.entity_id);
    let window = keys::action_window(event.entity_id);
    let c = &*self.counters;

    c.rank_update(
      &window,
      &event.action_id.to_string(),
      counters::encode_ts(event.occurred_at),
    )
    .await
    .map_err(EngineError::counter)?;

    for (field, delta) in [
      (counters::BOOST, self.cfg().boost_per_action),
      (counters::ACTIONS_1H, 1.0),
      (counters::ACTIONS_24H, 1.0),
    ] {
      c.increment(&key, field, delta).await.map_err(EngineError::counter)?;
    }
    c.set_field(&key, counters::LAST_BOOST_TS, counters::encode_ts(now))
      .await
      .map_err(EngineError::counter)?;

    self.touch(&[&key, &window]).await
  }

  pub async fn apply_join(
    &self,
    entity_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> Result<()> {
    let key = keys::entity(entity_id);
    let window = keys::join_window(entity_id);
    let c = &*self.counters;

    c.rank_update(&window, &user_id.to_string(), counters::encode_ts(joined_at))
      .await
      .map_err(EngineError::counter)?;
    for field in [counters::PARTICIPANTS_TOTAL, counters::NEW_PARTICIPANTS_24H] {
      c.increment(&key, field, 1.0).await.map_err(EngineError::counter)?;
    }

    self.touch(&[&key, &window]).await
  }

  async fn touch(&self, keys: &[&str]) -> Result<()> {
    let ttl = self.cfg().counter_ttl();
    for key in keys {
      self
        .counters
        .set_expiry(key, ttl)
        .await
        .map_err(EngineError::counter)?;
    }
    Ok(())
  }

  async fn deferred_refresh(&self, entity_id: Uuid) {
    let delay = self.config.ingest.refresh_delay();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    match self.impact.refresh_entity(entity_id).await {
      Ok(Some(index)) => debug!(%entity_id, index = index.index_score, "impact refreshed"),
      Ok(None) => debug!(%entity_id, "no entity to refresh"),
      Err(e) => warn!(%entity_id, error = %e, "impact refresh failed"),
    }
  }
}
