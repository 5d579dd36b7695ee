//! [`SqliteStore`]: the SQLite implementation of [`ActivityLog`] and
//! [`SummaryStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use rippl_core::{
  aggregate::{
    ImpactIndex, Summary, SummaryDraft, TrendingSnapshot, UserImpact,
    WriteOutcome,
  },
  catalog::{
    ActionEvent, BucketCount, Entity, EntityStatus, Group, Membership,
    NewAction, UserBucketCount, WindowEntry,
  },
  store::{ActivityLog, SummaryStore},
};

use crate::{
  Error, Result,
  encode::{
    ENTITY_COLUMNS, GROUP_COLUMNS, IMPACT_INDEX_COLUMNS, RawEntity, RawGroup,
    RawImpactIndex, RawMembership, RawSnapshot, RawSummary, RawUserImpact,
    SNAPSHOT_COLUMNS, SUMMARY_COLUMNS, USER_IMPACT_COLUMNS, action_event,
    decode_count, decode_dt, decode_uuid, encode_breakdown, encode_count,
    encode_dt, encode_uuid, encode_weights,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rippl activity log and summary store backed by a single SQLite file.
///
/// Clones share the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT COUNT(*)`-style query with one entity id and one optional
  /// lower time bound.
  async fn count_since(
    &self,
    sql: &'static str,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
    column: &'static str,
  ) -> Result<u64> {
    let id_str = encode_uuid(entity_id);
    let since_str = since.map(encode_dt);

    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(sql, rusqlite::params![id_str, since_str], |r| {
          r.get(0)
        })?)
      })
      .await?;

    decode_count(column, n)
  }

  async fn window(
    &self,
    sql: &'static str,
    entity_id: Uuid,
    since: DateTime<Utc>,
  ) -> Result<Vec<WindowEntry>> {
    let id_str = encode_uuid(entity_id);
    let since_str = encode_dt(since);

    let raws: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, since_str], |r| {
            Ok((r.get(0)?, r.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(id, at)| Ok(WindowEntry { id: decode_uuid(&id)?, at: decode_dt(&at)? }))
      .collect()
  }
}

// ─── ActivityLog impl ────────────────────────────────────────────────────────

impl ActivityLog for SqliteStore {
  type Error = Error;

  // ── Catalogue ─────────────────────────────────────────────────────────────

  async fn put_group(&self, group: Group) -> Result<Group> {
    let id_str       = encode_uuid(group.group_id);
    let name         = group.name.clone();
    let coefficient  = group.impact_coefficient;
    let unit         = group.impact_unit.clone();
    let source       = group.impact_source.clone();
    let weights_json = encode_weights(&group.bucket_weights)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO groups (
             group_id, name, impact_coefficient, impact_unit, impact_source,
             bucket_weights
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (group_id) DO UPDATE SET
             name               = excluded.name,
             impact_coefficient = excluded.impact_coefficient,
             impact_unit        = excluded.impact_unit,
             impact_source      = excluded.impact_source,
             bucket_weights     = excluded.bucket_weights",
          rusqlite::params![id_str, name, coefficient, unit, source, weights_json],
        )?;
        Ok(())
      })
      .await?;

    Ok(group)
  }

  async fn put_entity(&self, entity: Entity) -> Result<Entity> {
    if self.get_group(entity.group_id).await?.is_none() {
      return Err(Error::GroupNotFound(entity.group_id));
    }

    let id_str         = encode_uuid(entity.entity_id);
    let group_str      = encode_uuid(entity.group_id);
    let title          = entity.title.clone();
    let status_str     = entity.status.as_str();
    let default_bucket = entity.default_bucket.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO entities (entity_id, group_id, title, status, default_bucket)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (entity_id) DO UPDATE SET
             group_id       = excluded.group_id,
             title          = excluded.title,
             status         = excluded.status,
             default_bucket = excluded.default_bucket",
          rusqlite::params![id_str, group_str, title, status_str, default_bucket],
        )?;
        Ok(())
      })
      .await?;

    Ok(entity)
  }

  async fn get_group(&self, group_id: Uuid) -> Result<Option<Group>> {
    let id_str = encode_uuid(group_id);

    let raw: Option<RawGroup> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE group_id = ?1"),
            rusqlite::params![id_str],
            RawGroup::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawGroup::into_group).transpose()
  }

  async fn list_groups(&self) -> Result<Vec<Group>> {
    let raws: Vec<RawGroup> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {GROUP_COLUMNS} FROM groups ORDER BY group_id"))?;
        let rows = stmt
          .query_map([], RawGroup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGroup::into_group).collect()
  }

  async fn get_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1"),
            rusqlite::params![id_str],
            RawEntity::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list_entities(&self, status: Option<EntityStatus>) -> Result<Vec<Entity>> {
    let status_str = status.map(EntityStatus::as_str);

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITY_COLUMNS} FROM entities
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY entity_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  // ── Appends ───────────────────────────────────────────────────────────────

  async fn record_action(&self, input: NewAction) -> Result<ActionEvent> {
    let entity = self
      .get_entity(input.entity_id)
      .await?
      .ok_or(Error::EntityNotFound(input.entity_id))?;

    let event = action_event(
      Uuid::new_v4(),
      &entity,
      input.user_id,
      input.bucket.unwrap_or_else(|| entity.default_bucket.clone()),
      input.occurred_at.unwrap_or_else(Utc::now),
    );

    let action_str = encode_uuid(event.action_id);
    let entity_str = encode_uuid(event.entity_id);
    let group_str  = encode_uuid(event.group_id);
    let user_str   = encode_uuid(event.user_id);
    let bucket     = event.bucket.clone();
    let at_str     = encode_dt(event.occurred_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO actions (action_id, entity_id, group_id, user_id, bucket, occurred_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![action_str, entity_str, group_str, user_str, bucket, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn join(
    &self,
    user_id: Uuid,
    entity_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> Result<Membership> {
    if self.get_entity(entity_id).await?.is_none() {
      return Err(Error::EntityNotFound(entity_id));
    }

    let user_str   = encode_uuid(user_id);
    let entity_str = encode_uuid(entity_id);
    let at_str     = encode_dt(joined_at);

    // Re-joining an inactive membership restarts its join time; joining
    // while already active is a no-op.
    let raw: RawMembership = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO memberships (user_id, entity_id, joined_at, is_active)
           VALUES (?1, ?2, ?3, 1)
           ON CONFLICT (user_id, entity_id) DO UPDATE SET
             joined_at = CASE WHEN is_active = 0 THEN excluded.joined_at ELSE joined_at END,
             is_active = 1",
          rusqlite::params![user_str, entity_str, at_str],
        )?;
        let raw = tx.query_row(
          "SELECT user_id, entity_id, joined_at, is_active FROM memberships
           WHERE user_id = ?1 AND entity_id = ?2",
          rusqlite::params![user_str, entity_str],
          RawMembership::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_membership()
  }

  async fn leave(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool> {
    let user_str   = encode_uuid(user_id);
    let entity_str = encode_uuid(entity_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE memberships SET is_active = 0
           WHERE user_id = ?1 AND entity_id = ?2 AND is_active = 1",
          rusqlite::params![user_str, entity_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Per-entity reads ──────────────────────────────────────────────────────

  async fn count_participants(
    &self,
    entity_id: Uuid,
    joined_since: Option<DateTime<Utc>>,
  ) -> Result<u64> {
    self
      .count_since(
        "SELECT COUNT(*) FROM memberships
         WHERE entity_id = ?1 AND is_active = 1
           AND (?2 IS NULL OR joined_at >= ?2)",
        entity_id,
        joined_since,
        "participants",
      )
      .await
  }

  async fn count_actions(
    &self,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> Result<u64> {
    self
      .count_since(
        "SELECT COUNT(*) FROM actions
         WHERE entity_id = ?1 AND (?2 IS NULL OR occurred_at >= ?2)",
        entity_id,
        since,
        "actions",
      )
      .await
  }

  async fn bucket_counts(
    &self,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<BucketCount>> {
    let id_str = encode_uuid(entity_id);
    let since_str = since.map(encode_dt);

    let raws: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT bucket, COUNT(*) FROM actions
           WHERE entity_id = ?1 AND (?2 IS NULL OR occurred_at >= ?2)
           GROUP BY bucket
           ORDER BY bucket",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, since_str], |r| {
            Ok((r.get(0)?, r.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(bucket, n)| Ok(BucketCount { bucket, count: decode_count("count", n)? }))
      .collect()
  }

  async fn recent_actions(
    &self,
    entity_id: Uuid,
    since: DateTime<Utc>,
  ) -> Result<Vec<WindowEntry>> {
    self
      .window(
        "SELECT action_id, occurred_at FROM actions
         WHERE entity_id = ?1 AND occurred_at >= ?2
         ORDER BY occurred_at",
        entity_id,
        since,
      )
      .await
  }

  async fn recent_joins(
    &self,
    entity_id: Uuid,
    since: DateTime<Utc>,
  ) -> Result<Vec<WindowEntry>> {
    self
      .window(
        "SELECT user_id, joined_at FROM memberships
         WHERE entity_id = ?1 AND is_active = 1 AND joined_at >= ?2
         ORDER BY joined_at",
        entity_id,
        since,
      )
      .await
  }

  // ── Per-user reads ────────────────────────────────────────────────────────

  async fn users_with_actions(&self) -> Result<Vec<Uuid>> {
    let raws: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT user_id FROM actions ORDER BY user_id")?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>> {
    let id_str = encode_uuid(user_id);

    let raws: Vec<RawMembership> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id, entity_id, joined_at, is_active FROM memberships
           WHERE user_id = ?1 AND is_active = 1
           ORDER BY entity_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawMembership::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMembership::into_membership).collect()
  }

  async fn user_bucket_counts(
    &self,
    user_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<UserBucketCount>> {
    let id_str = encode_uuid(user_id);
    let since_str = since.map(encode_dt);

    let raws: Vec<(String, String, String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_id, group_id, bucket, COUNT(*) FROM actions
           WHERE user_id = ?1 AND (?2 IS NULL OR occurred_at >= ?2)
           GROUP BY entity_id, group_id, bucket
           ORDER BY entity_id, bucket",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, since_str], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(entity, group, bucket, n)| {
        Ok(UserBucketCount {
          entity_id: decode_uuid(&entity)?,
          group_id: decode_uuid(&group)?,
          bucket,
          count: decode_count("count", n)?,
        })
      })
      .collect()
  }
}

// ─── SummaryStore impl ───────────────────────────────────────────────────────

impl SummaryStore for SqliteStore {
  type Error = Error;

  // ── Summaries ─────────────────────────────────────────────────────────────

  async fn get_summary(&self, entity_id: Uuid) -> Result<Option<Summary>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawSummary> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SUMMARY_COLUMNS} FROM summaries WHERE entity_id = ?1"),
            rusqlite::params![id_str],
            RawSummary::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSummary::into_summary).transpose()
  }

  async fn list_summaries(&self) -> Result<Vec<Summary>> {
    let raws: Vec<RawSummary> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUMMARY_COLUMNS} FROM summaries ORDER BY entity_id"
        ))?;
        let rows = stmt
          .query_map([], RawSummary::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSummary::into_summary).collect()
  }

  async fn write_summary(
    &self,
    draft: SummaryDraft,
    expected_version: u64,
  ) -> Result<WriteOutcome> {
    let updated_at = Utc::now();

    let id_str       = encode_uuid(draft.entity_id);
    let participants = encode_count(draft.participants);
    let actions      = encode_count(draft.actions_total);
    let lifetime     = draft.impact_lifetime;
    let window_30d   = draft.impact_30d;
    let unit         = draft.impact_unit.clone();
    let at_str       = encode_dt(updated_at);
    let expected     = encode_count(expected_version);

    // Version 0 means "no row yet": only an insert can satisfy it. Otherwise
    // the update matches only while the stored version is unchanged.
    let changed: usize = self
      .conn
      .call(move |conn| {
        let n = if expected == 0 {
          conn.execute(
            "INSERT INTO summaries (
               entity_id, participants, actions_total, impact_lifetime,
               impact_30d, impact_unit, updated_at, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
             ON CONFLICT (entity_id) DO NOTHING",
            rusqlite::params![id_str, participants, actions, lifetime, window_30d, unit, at_str],
          )?
        } else {
          conn.execute(
            "UPDATE summaries SET
               participants    = ?2,
               actions_total   = ?3,
               impact_lifetime = ?4,
               impact_30d      = ?5,
               impact_unit     = ?6,
               updated_at      = ?7,
               version         = version + 1
             WHERE entity_id = ?1 AND version = ?8",
            rusqlite::params![
              id_str,
              participants,
              actions,
              lifetime,
              window_30d,
              unit,
              at_str,
              expected,
            ],
          )?
        };
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Ok(WriteOutcome::Conflict);
    }

    Ok(WriteOutcome::Committed(Summary {
      entity_id: draft.entity_id,
      participants: draft.participants,
      actions_total: draft.actions_total,
      impact_lifetime: draft.impact_lifetime,
      impact_30d: draft.impact_30d,
      impact_unit: draft.impact_unit,
      updated_at,
      version: expected_version + 1,
    }))
  }

  // ── Trending snapshots ────────────────────────────────────────────────────

  async fn insert_snapshot(&self, snapshot: TrendingSnapshot) -> Result<()> {
    let entity_str = encode_uuid(snapshot.entity_id);
    let group_str  = encode_uuid(snapshot.group_id);
    let at_str     = encode_dt(snapshot.calculated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO trending_snapshots ({SNAPSHOT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT (entity_id, calculated_at) DO UPDATE SET
               score                = excluded.score,
               rank_score           = excluded.rank_score,
               participants         = excluded.participants,
               actions_24h          = excluded.actions_24h,
               actions_1h           = excluded.actions_1h,
               new_participants_24h = excluded.new_participants_24h,
               boost                = excluded.boost,
               is_top_ten           = excluded.is_top_ten,
               top_ten_days         = excluded.top_ten_days"
          ),
          rusqlite::params![
            entity_str,
            group_str,
            snapshot.score,
            snapshot.rank_score,
            encode_count(snapshot.participants),
            encode_count(snapshot.actions_24h),
            encode_count(snapshot.actions_1h),
            encode_count(snapshot.new_participants_24h),
            snapshot.boost,
            snapshot.is_top_ten,
            snapshot.top_ten_days,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn latest_snapshots(
    &self,
    group_id: Option<Uuid>,
    since: DateTime<Utc>,
  ) -> Result<Vec<TrendingSnapshot>> {
    let group_str = group_id.map(encode_uuid);
    let since_str = encode_dt(since);

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        // Every snapshot of one run shares its `calculated_at`.
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM trending_snapshots
           WHERE calculated_at >= ?1
             AND (?2 IS NULL OR group_id = ?2)
             AND calculated_at = (SELECT MAX(calculated_at) FROM trending_snapshots)
           ORDER BY rank_score DESC, entity_id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![since_str, group_str], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn latest_snapshot(&self, entity_id: Uuid) -> Result<Option<TrendingSnapshot>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {SNAPSHOT_COLUMNS} FROM trending_snapshots
               WHERE entity_id = ?1
               ORDER BY calculated_at DESC
               LIMIT 1"
            ),
            rusqlite::params![id_str],
            RawSnapshot::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn prune_snapshots(&self, before: DateTime<Utc>) -> Result<u64> {
    let before_str = encode_dt(before);

    let n: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM trending_snapshots WHERE calculated_at < ?1",
          rusqlite::params![before_str],
        )?)
      })
      .await?;

    Ok(n as u64)
  }

  // ── Impact ────────────────────────────────────────────────────────────────

  async fn upsert_impact_index(&self, index: ImpactIndex) -> Result<()> {
    let entity_str = encode_uuid(index.entity_id);
    let group_str  = encode_uuid(index.group_id);
    let at_str     = encode_dt(index.calculated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO impact_indexes ({IMPACT_INDEX_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (entity_id) DO UPDATE SET
               group_id          = excluded.group_id,
               index_score       = excluded.index_score,
               median_impact     = excluded.median_impact,
               ripple_impact     = excluded.ripple_impact,
               participant_count = excluded.participant_count,
               eligible_actions  = excluded.eligible_actions,
               is_visible        = excluded.is_visible,
               calculated_at     = excluded.calculated_at"
          ),
          rusqlite::params![
            entity_str,
            group_str,
            index.index_score,
            index.median_impact,
            index.ripple_impact,
            encode_count(index.participant_count),
            index.eligible_actions,
            index.is_visible,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_impact_index(&self, entity_id: Uuid) -> Result<Option<ImpactIndex>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawImpactIndex> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {IMPACT_INDEX_COLUMNS} FROM impact_indexes WHERE entity_id = ?1"
            ),
            rusqlite::params![id_str],
            RawImpactIndex::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawImpactIndex::into_index).transpose()
  }

  async fn upsert_user_impact(&self, impact: UserImpact) -> Result<()> {
    let user_str      = encode_uuid(impact.user_id);
    let total         = encode_count(impact.total_actions);
    let eligible      = impact.eligible_actions;
    let joined        = encode_count(impact.entities_joined);
    let lifetime_json = encode_breakdown(&impact.lifetime)?;
    let window_json   = encode_breakdown(&impact.window_30d)?;
    let at_str        = encode_dt(impact.calculated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO user_impacts ({USER_IMPACT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (user_id) DO UPDATE SET
               total_actions    = excluded.total_actions,
               eligible_actions = excluded.eligible_actions,
               entities_joined  = excluded.entities_joined,
               lifetime         = excluded.lifetime,
               window_30d       = excluded.window_30d,
               calculated_at    = excluded.calculated_at"
          ),
          rusqlite::params![
            user_str,
            total,
            eligible,
            joined,
            lifetime_json,
            window_json,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_user_impact(&self, user_id: Uuid) -> Result<Option<UserImpact>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawUserImpact> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_IMPACT_COLUMNS} FROM user_impacts WHERE user_id = ?1"),
            rusqlite::params![id_str],
            RawUserImpact::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUserImpact::into_user_impact).transpose()
  }
}
