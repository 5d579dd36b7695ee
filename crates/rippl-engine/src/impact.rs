//! Bucket-weighted impact, the relative impact index, and per-user rollups.
//!
//! An action counts toward impact in proportion to its bucket's weight in
//! the entity's group; buckets the group does not configure weigh nothing.
//! Impact is `eligible × coefficient` and keeps its sign. Anything shown to
//! a user takes the absolute value.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::Arc,
  time::Instant,
};

use chrono::{DateTime, Duration, Utc};
use rippl_core::{
  aggregate::{GroupImpact, ImpactIndex, SummaryDraft, UserImpact},
  catalog::{BucketCount, Entity, EntityStatus, Group, UserBucketCount},
  stats,
  store::{ActivityLog, SummaryStore},
};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  EngineError, Result,
  config::{EngineConfig, ImpactConfig},
  job::{CycleReport, JobKind},
  retry::{self, RetryOutcome},
};

// ─── Eligibility ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketContribution {
  pub bucket:       String,
  pub count:        u64,
  pub weight:       f64,
  pub contribution: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Eligibility {
  /// Every action, eligible or not.
  pub total_actions: u64,
  pub eligible:      f64,
  pub breakdown:     Vec<BucketContribution>,
  /// Buckets seen in the counts that the group has no weight for.
  pub unconfigured:  Vec<String>,
}

/// Weight bucket counts by the group's bucket table.
pub fn eligible_actions(counts: &[BucketCount], group: &Group) -> Eligibility {
  let mut out = Eligibility::default();
  for c in counts {
    let weight = match group.bucket_weight(&c.bucket) {
      Some(w) => w,
      None => {
        out.unconfigured.push(c.bucket.clone());
        0.0
      }
    };
    let contribution = c.count as f64 * weight;
    out.total_actions += c.count;
    out.eligible += contribution;
    out.breakdown.push(BucketContribution {
      bucket: c.bucket.clone(),
      count: c.count,
      weight,
      contribution,
    });
  }
  out
}

pub fn impact_value(eligible: f64, coefficient: f64) -> f64 { eligible * coefficient }

/// One entity's measured impact, before it is written anywhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityImpact {
  pub entity_id:       Uuid,
  pub group_id:        Uuid,
  pub participants:    u64,
  pub lifetime:        Eligibility,
  pub window:          Eligibility,
  pub impact_lifetime: f64,
  pub impact_30d:      f64,
  pub unit:            String,
}

impl EntityImpact {
  fn index(&self, median: f64, config: &ImpactConfig, now: DateTime<Utc>) -> ImpactIndex {
    let ripple_impact = self.impact_30d.abs();
    ImpactIndex {
      entity_id: self.entity_id,
      group_id: self.group_id,
      index_score: stats::relative_index(ripple_impact, median),
      median_impact: median,
      ripple_impact,
      participant_count: self.participants,
      eligible_actions: self.window.eligible,
      is_visible: self.participants >= config.min_participants
        && self.window.eligible >= config.min_eligible,
      calculated_at: now,
    }
  }
}

/// One entity's line in a [`GroupImpactSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityImpactLine {
  pub entity_id:        Uuid,
  pub title:            String,
  pub actions:          u64,
  pub eligible_actions: f64,
  /// Absolute lifetime impact.
  pub impact_value:     f64,
}

/// Lifetime impact across a group's entities, measured from the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupImpactSummary {
  pub group_id:         Uuid,
  pub name:             String,
  pub unit:             String,
  pub impact_source:    String,
  /// Set when the summary covers only one user's memberships.
  pub user_id:          Option<Uuid>,
  pub total_actions:    u64,
  pub eligible_actions: f64,
  pub impact_value:     f64,
  pub breakdown:        Vec<EntityImpactLine>,
}

/// Warns about each unconfigured bucket (and missing group) once per cycle.
#[derive(Default)]
struct ConfigWarnings {
  seen: HashSet<(Uuid, String)>,
}

impl ConfigWarnings {
  fn bucket(&mut self, group_id: Uuid, bucket: &str) {
    if self.seen.insert((group_id, bucket.to_owned())) {
      warn!(%group_id, bucket, "bucket has no weight; counted as ineligible");
    }
  }

  fn group(&mut self, group_id: Uuid) {
    if self.seen.insert((group_id, String::new())) {
      warn!(%group_id, "group not found; impact coefficient treated as 0");
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct ImpactEngine<L, S> {
  log:       Arc<L>,
  summaries: Arc<S>,
  config:    Arc<EngineConfig>,
}

impl<L, S> ImpactEngine<L, S>
where
  L: ActivityLog,
  S: SummaryStore,
{
  pub fn new(log: Arc<L>, summaries: Arc<S>, config: Arc<EngineConfig>) -> Self {
    Self { log, summaries, config }
  }

  fn cfg(&self) -> &ImpactConfig { &self.config.impact }

  fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(self.cfg().window_days)
  }

  async fn groups(&self) -> Result<HashMap<Uuid, Group>> {
    let groups = self.log.list_groups().await.map_err(EngineError::log)?;
    Ok(groups.into_iter().map(|g| (g.group_id, g)).collect())
  }

  pub async fn run_cycle(&self) -> Result<CycleReport> { self.run_cycle_at(Utc::now()).await }

  /// Recompute every entity's summary and index, then every user's rollup.
  pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
    let clock = Instant::now();
    let mut report = CycleReport::begin(JobKind::Impact, now);
    let mut warnings = ConfigWarnings::default();

    let groups = self.groups().await?;
    let entities = self.log.list_entities(None).await.map_err(EngineError::log)?;
    report.processed = entities.len();

    let mut measured: Vec<EntityImpact> = Vec::with_capacity(entities.len());
    for entity in &entities {
      let group = groups.get(&entity.group_id);
      let m = match self.measure(entity, group, now, &mut warnings).await {
        Ok(m) => m,
        Err(e) => {
          warn!(entity_id = %entity.entity_id, error = %e, "impact measurement failed");
          report.failed += 1;
          continue;
        }
      };
      match self.persist_summary(&m).await {
        Ok(RetryOutcome::Committed(_)) => {}
        Ok(RetryOutcome::GaveUp) => report.skipped += 1,
        Err(e) => {
          warn!(entity_id = %m.entity_id, error = %e, "summary write failed");
          report.failed += 1;
        }
      }
      measured.push(m);
    }

    // Median per group over everything just measured.
    let mut by_group: HashMap<Uuid, Vec<f64>> = HashMap::new();
    for m in &measured {
      by_group.entry(m.group_id).or_default().push(m.impact_30d.abs());
    }
    let medians: HashMap<Uuid, f64> = by_group
      .into_iter()
      .map(|(g, values)| (g, stats::median(&values)))
      .collect();

    for m in &measured {
      let median = medians.get(&m.group_id).copied().unwrap_or(0.0);
      let index = m.index(median, self.cfg(), now);
      match self.summaries.upsert_impact_index(index).await {
        Ok(()) => report.succeeded += 1,
        Err(e) => {
          warn!(entity_id = %m.entity_id, error = %e, "impact index write failed");
          report.failed += 1;
        }
      }
    }

    let (users_ok, users_failed) = match self.aggregate_users(&groups, now).await {
      Ok(tally) => tally,
      Err(e) => {
        error!(error = %e, "user aggregation aborted");
        (0, 0)
      }
    };

    report.duration = clock.elapsed();
    info!(
      processed = report.processed,
      indexed = report.succeeded,
      skipped = report.skipped,
      failed = report.failed,
      users = users_ok,
      users_failed,
      elapsed_ms = report.duration.as_millis() as u64,
      "impact cycle complete"
    );
    Ok(report)
  }

  /// Lifetime and windowed impact of one entity, read from the log.
  pub async fn measure_entity_at(
    &self,
    entity: &Entity,
    now: DateTime<Utc>,
  ) -> Result<EntityImpact> {
    let group = self.log.get_group(entity.group_id).await.map_err(EngineError::log)?;
    self
      .measure(entity, group.as_ref(), now, &mut ConfigWarnings::default())
      .await
  }

  async fn measure(
    &self,
    entity: &Entity,
    group: Option<&Group>,
    now: DateTime<Utc>,
    warnings: &mut ConfigWarnings,
  ) -> Result<EntityImpact> {
    let id = entity.entity_id;
    let participants = self
      .log
      .count_participants(id, None)
      .await
      .map_err(EngineError::log)?;
    let lifetime_counts = self.log.bucket_counts(id, None).await.map_err(EngineError::log)?;
    let window_counts = self
      .log
      .bucket_counts(id, Some(self.window_start(now)))
      .await
      .map_err(EngineError::log)?;

    let (lifetime, window, coefficient, unit) = match group {
      Some(g) => {
        let lifetime = eligible_actions(&lifetime_counts, g);
        for bucket in &lifetime.unconfigured {
          warnings.bucket(g.group_id, bucket);
        }
        let window = eligible_actions(&window_counts, g);
        (lifetime, window, g.impact_coefficient, g.impact_unit.clone())
      }
      None => {
        warnings.group(entity.group_id);
        let unweighted = |counts: &[BucketCount]| Eligibility {
          total_actions: counts.iter().map(|c| c.count).sum(),
          ..Eligibility::default()
        };
        (unweighted(&lifetime_counts), unweighted(&window_counts), 0.0, String::new())
      }
    };

    Ok(EntityImpact {
      entity_id: id,
      group_id: entity.group_id,
      participants,
      impact_lifetime: impact_value(lifetime.eligible, coefficient),
      impact_30d: impact_value(window.eligible, coefficient),
      lifetime,
      window,
      unit,
    })
  }

  async fn persist_summary(&self, m: &EntityImpact) -> Result<RetryOutcome> {
    retry::update_summary(
      &*self.summaries,
      m.entity_id,
      self.cfg().max_write_attempts,
      |cur| SummaryDraft {
        participants: m.participants,
        actions_total: m.lifetime.total_actions,
        impact_lifetime: m.impact_lifetime,
        impact_30d: m.impact_30d,
        impact_unit: m.unit.clone(),
        ..SummaryDraft::from_current(m.entity_id, cur)
      },
    )
    .await
  }

  pub async fn refresh_entity(&self, entity_id: Uuid) -> Result<Option<ImpactIndex>> {
    self.refresh_entity_at(entity_id, Utc::now()).await
  }

  /// Recompute one entity's summary and index. The median comes from the
  /// stored 30-day impact of its peers plus this entity's fresh value.
  pub async fn refresh_entity_at(
    &self,
    entity_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Option<ImpactIndex>> {
    let Some(entity) = self.log.get_entity(entity_id).await.map_err(EngineError::log)? else {
      debug!(%entity_id, "refresh requested for unknown entity");
      return Ok(None);
    };

    let m = self.measure_entity_at(&entity, now).await?;
    if self.persist_summary(&m).await? == RetryOutcome::GaveUp {
      debug!(%entity_id, "summary left for the next impact cycle");
    }

    let peers: HashSet<Uuid> = self
      .log
      .list_entities(None)
      .await
      .map_err(EngineError::log)?
      .into_iter()
      .filter(|e| e.group_id == entity.group_id && e.entity_id != entity_id)
      .map(|e| e.entity_id)
      .collect();
    let stored: HashMap<Uuid, f64> = self
      .summaries
      .list_summaries()
      .await
      .map_err(EngineError::summary)?
      .into_iter()
      .map(|s| (s.entity_id, s.impact_30d.abs()))
      .collect();

    let mut values: Vec<f64> = peers
      .iter()
      .map(|p| stored.get(p).copied().unwrap_or(0.0))
      .collect();
    values.push(m.impact_30d.abs());

    let index = m.index(stats::median(&values), self.cfg(), now);
    self
      .summaries
      .upsert_impact_index(index.clone())
      .await
      .map_err(EngineError::summary)?;
    debug!(%entity_id, index = index.index_score, "entity impact refreshed");
    Ok(Some(index))
  }

  // ── Groups ────────────────────────────────────────────────────────────────

  pub async fn group_summary(
    &self,
    group_id: Uuid,
    user_id: Option<Uuid>,
  ) -> Result<Option<GroupImpactSummary>> {
    self.group_summary_at(group_id, user_id, Utc::now()).await
  }

  /// Impact of every active entity in a group, or with `user_id` of the
  /// entities that user is an active member of (archived ones included).
  /// `None` for an unknown group.
  pub async fn group_summary_at(
    &self,
    group_id: Uuid,
    user_id: Option<Uuid>,
    now: DateTime<Utc>,
  ) -> Result<Option<GroupImpactSummary>> {
    let Some(group) = self.log.get_group(group_id).await.map_err(EngineError::log)? else {
      return Ok(None);
    };

    let mut entities: Vec<Entity> = self
      .log
      .list_entities(None)
      .await
      .map_err(EngineError::log)?
      .into_iter()
      .filter(|e| e.group_id == group_id)
      .collect();
    match user_id {
      Some(user) => {
        let joined: HashSet<Uuid> = self
          .log
          .user_memberships(user)
          .await
          .map_err(EngineError::log)?
          .into_iter()
          .map(|m| m.entity_id)
          .collect();
        entities.retain(|e| joined.contains(&e.entity_id));
      }
      None => entities.retain(|e| e.status == EntityStatus::Active),
    }

    let mut warnings = ConfigWarnings::default();
    let mut breakdown = Vec::with_capacity(entities.len());
    let mut signed = 0.0;
    for entity in &entities {
      let m = self.measure(entity, Some(&group), now, &mut warnings).await?;
      signed += m.impact_lifetime;
      breakdown.push(EntityImpactLine {
        entity_id:        entity.entity_id,
        title:            entity.title.clone(),
        actions:          m.lifetime.total_actions,
        eligible_actions: m.lifetime.eligible,
        impact_value:     m.impact_lifetime.abs(),
      });
    }

    Ok(Some(GroupImpactSummary {
      group_id,
      name: group.name,
      unit: group.impact_unit,
      impact_source: group.impact_source,
      user_id,
      total_actions: breakdown.iter().map(|l| l.actions).sum(),
      eligible_actions: breakdown.iter().map(|l| l.eligible_actions).sum(),
      impact_value: signed.abs(),
      breakdown,
    }))
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  /// Returns `(written, failed)`.
  async fn aggregate_users(
    &self,
    groups: &HashMap<Uuid, Group>,
    now: DateTime<Utc>,
  ) -> Result<(usize, usize)> {
    let users = self.log.users_with_actions().await.map_err(EngineError::log)?;
    let (mut ok, mut failed) = (0, 0);
    for user_id in users {
      let written = match self.user_impact(user_id, groups, now).await {
        Ok(impact) => self
          .summaries
          .upsert_user_impact(impact)
          .await
          .map_err(EngineError::summary),
        Err(e) => Err(e),
      };
      match written {
        Ok(()) => ok += 1,
        Err(e) => {
          warn!(%user_id, error = %e, "user impact failed");
          failed += 1;
        }
      }
    }
    Ok((ok, failed))
  }

  pub async fn refresh_user(&self, user_id: Uuid) -> Result<UserImpact> {
    self.refresh_user_at(user_id, Utc::now()).await
  }

  /// Recompute and store one user's rollup.
  pub async fn refresh_user_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UserImpact> {
    let groups = self.groups().await?;
    let impact = self.user_impact(user_id, &groups, now).await?;
    self
      .summaries
      .upsert_user_impact(impact.clone())
      .await
      .map_err(EngineError::summary)?;
    debug!(%user_id, actions = impact.total_actions, "user impact refreshed");
    Ok(impact)
  }

  /// A user's impact over the entities they have joined.
  pub async fn user_impact(
    &self,
    user_id: Uuid,
    groups: &HashMap<Uuid, Group>,
    now: DateTime<Utc>,
  ) -> Result<UserImpact> {
    let joined: HashSet<Uuid> = self
      .log
      .user_memberships(user_id)
      .await
      .map_err(EngineError::log)?
      .into_iter()
      .map(|m| m.entity_id)
      .collect();

    let mut lifetime_counts = self
      .log
      .user_bucket_counts(user_id, None)
      .await
      .map_err(EngineError::log)?;
    lifetime_counts.retain(|c| joined.contains(&c.entity_id));
    let mut window_counts = self
      .log
      .user_bucket_counts(user_id, Some(self.window_start(now)))
      .await
      .map_err(EngineError::log)?;
    window_counts.retain(|c| joined.contains(&c.entity_id));

    let lifetime = rollup(&lifetime_counts, groups);
    let window_30d = rollup(&window_counts, groups);

    Ok(UserImpact {
      user_id,
      total_actions: lifetime.iter().map(|g| g.actions).sum(),
      eligible_actions: lifetime.iter().map(|g| g.eligible).sum(),
      entities_joined: joined.len() as u64,
      lifetime,
      window_30d,
      calculated_at: now,
    })
  }
}

/// Group per-entity bucket counts by parent group.
fn rollup(counts: &[UserBucketCount], groups: &HashMap<Uuid, Group>) -> Vec<GroupImpact> {
  let mut out: BTreeMap<Uuid, GroupImpact> = BTreeMap::new();
  for c in counts {
    let group = groups.get(&c.group_id);
    let entry = out.entry(c.group_id).or_insert_with(|| GroupImpact {
      group_id: c.group_id,
      actions:  0,
      eligible: 0.0,
      impact:   0.0,
      unit:     group.map(|g| g.impact_unit.clone()).unwrap_or_default(),
    });
    let weight = group.and_then(|g| g.bucket_weight(&c.bucket)).unwrap_or(0.0);
    entry.actions += c.count;
    entry.eligible += c.count as f64 * weight;
  }
  out
    .into_values()
    .map(|mut g| {
      let coefficient = groups.get(&g.group_id).map_or(0.0, |x| x.impact_coefficient);
      g.impact = impact_value(g.eligible, coefficient);
      g
    })
    .collect()
}
