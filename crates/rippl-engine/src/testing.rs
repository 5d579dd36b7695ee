//! Shared fixtures for engine tests: an in-memory counter store and an
//! in-memory SQLite log/summary store seeded with one group.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use rippl_core::{
  catalog::{Entity, EntityStatus, Group, NewAction},
  store::ActivityLog,
};
use rippl_counters::MemoryCounterStore;
use rippl_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{config::EngineConfig, impact::ImpactEngine, trending::TrendingEngine};

pub fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() }

pub struct Fixture {
  pub counters:  Arc<MemoryCounterStore>,
  pub log:       Arc<SqliteStore>,
  pub summaries: Arc<SqliteStore>,
  pub config:    Arc<EngineConfig>,
  pub group:     Group,
}

impl Fixture {
  pub async fn new() -> Self { Self::with_coefficient(0.5).await }

  pub async fn with_coefficient(coefficient: f64) -> Self {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let group = store
      .put_group(Group {
        group_id:           Uuid::new_v4(),
        name:               "Environment".into(),
        impact_coefficient: coefficient,
        impact_unit:        "kg litter".into(),
        impact_source:      "field survey".into(),
        bucket_weights:     BTreeMap::from([
          ("pick_up_litter".to_owned(), 1.0),
          ("bring_reusable".to_owned(), 0.5),
        ]),
      })
      .await
      .unwrap();

    Self {
      counters: Arc::new(MemoryCounterStore::default()),
      log: store.clone(),
      summaries: store,
      config: Arc::new(EngineConfig::default()),
      group,
    }
  }

  pub fn trending(&self) -> TrendingEngine<MemoryCounterStore, SqliteStore, SqliteStore> {
    TrendingEngine::new(
      self.counters.clone(),
      self.log.clone(),
      self.summaries.clone(),
      self.config.clone(),
    )
  }

  pub fn impact(&self) -> ImpactEngine<SqliteStore, SqliteStore> {
    ImpactEngine::new(self.log.clone(), self.summaries.clone(), self.config.clone())
  }

  pub async fn entity(&self) -> Entity {
    self
      .log
      .put_entity(Entity {
        entity_id:      Uuid::new_v4(),
        group_id:       self.group.group_id,
        title:          "Litter Free Fridays".into(),
        status:         EntityStatus::Active,
        default_bucket: "pick_up_litter".into(),
      })
      .await
      .unwrap()
  }

  /// A fresh entity with `participants` members who joined at `at` and
  /// `actions` default-bucket actions at `at`, spread across the members.
  pub async fn entity_with(
    &self,
    participants: usize,
    actions: usize,
    at: DateTime<Utc>,
  ) -> (Entity, Vec<Uuid>) {
    let entity = self.entity().await;
    let users: Vec<Uuid> = (0..participants.max(1)).map(|_| Uuid::new_v4()).collect();
    for user in users.iter().take(participants) {
      self.log.join(*user, entity.entity_id, at).await.unwrap();
    }
    for i in 0..actions {
      self.act(&entity, users[i % users.len()], None, at).await;
    }
    (entity, users)
  }

  pub async fn act(
    &self,
    entity: &Entity,
    user: Uuid,
    bucket: Option<&str>,
    at: DateTime<Utc>,
  ) {
    self
      .log
      .record_action(NewAction {
        entity_id:   entity.entity_id,
        user_id:     user,
        bucket:      bucket.map(str::to_owned),
        occurred_at: Some(at),
      })
      .await
      .unwrap();
  }
}
