//! The read → mutate → conditional-write loop shared by both engines.

use rippl_core::{
  aggregate::{Summary, SummaryDraft, WriteOutcome},
  store::SummaryStore,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
  Committed(Summary),
  /// Every attempt lost the version race.
  GaveUp,
}

/// Apply `mutate` to an entity's summary under optimistic concurrency.
///
/// Each attempt re-reads the row, so `mutate` always sees the latest
/// committed state. After `max_attempts` conflicts the write is abandoned.
pub async fn update_summary<S, F>(
  store: &S,
  entity_id: Uuid,
  max_attempts: u32,
  mut mutate: F,
) -> Result<RetryOutcome>
where
  S: SummaryStore,
  F: FnMut(Option<&Summary>) -> SummaryDraft,
{
  for attempt in 1..=max_attempts.max(1) {
    let current = store.get_summary(entity_id).await.map_err(EngineError::summary)?;
    let expected = current.as_ref().map_or(0, |s| s.version);
    let draft = mutate(current.as_ref());

    match store
      .write_summary(draft, expected)
      .await
      .map_err(EngineError::summary)?
    {
      WriteOutcome::Committed(summary) => return Ok(RetryOutcome::Committed(summary)),
      WriteOutcome::Conflict => {
        debug!(%entity_id, attempt, expected, "summary version conflict");
      }
    }
  }

  warn!(%entity_id, max_attempts, "summary write abandoned after repeated conflicts");
  Ok(RetryOutcome::GaveUp)
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use chrono::{DateTime, Utc};
  use rippl_core::aggregate::{ImpactIndex, TrendingSnapshot, UserImpact};
  use rippl_store_sqlite::SqliteStore;
  use tokio::sync::Barrier;

  use super::*;

  /// Delegates to SQLite but reports a conflict for the first `conflicts`
  /// writes. With `lockstep`, the first two reads wait for each other.
  struct Contended {
    inner:     SqliteStore,
    conflicts: AtomicU32,
    writes:    AtomicU32,
    reads:     AtomicU32,
    lockstep:  Option<Barrier>,
  }

  impl Contended {
    async fn new(conflicts: u32) -> Self {
      Self {
        inner:     SqliteStore::open_in_memory().await.unwrap(),
        conflicts: AtomicU32::new(conflicts),
        writes:    AtomicU32::new(0),
        reads:     AtomicU32::new(0),
        lockstep:  None,
      }
    }

    async fn lockstep() -> Self {
      Self { lockstep: Some(Barrier::new(2)), ..Self::new(0).await }
    }
  }

  impl SummaryStore for Contended {
    type Error = rippl_store_sqlite::Error;

    async fn get_summary(&self, id: Uuid) -> Result<Option<Summary>, Self::Error> {
      if let Some(barrier) = &self.lockstep
        && self.reads.fetch_add(1, Ordering::SeqCst) < 2
      {
        barrier.wait().await;
      }
      self.inner.get_summary(id).await
    }

    async fn list_summaries(&self) -> Result<Vec<Summary>, Self::Error> {
      self.inner.list_summaries().await
    }

    async fn write_summary(
      &self,
      draft: SummaryDraft,
      expected: u64,
    ) -> Result<WriteOutcome, Self::Error> {
      self.writes.fetch_add(1, Ordering::SeqCst);
      let left = self.conflicts.load(Ordering::SeqCst);
      if left > 0 {
        self.conflicts.store(left - 1, Ordering::SeqCst);
        return Ok(WriteOutcome::Conflict);
      }
      self.inner.write_summary(draft, expected).await
    }

    async fn insert_snapshot(&self, s: TrendingSnapshot) -> Result<(), Self::Error> {
      self.inner.insert_snapshot(s).await
    }

    async fn latest_snapshots(
      &self,
      group_id: Option<Uuid>,
      since: DateTime<Utc>,
    ) -> Result<Vec<TrendingSnapshot>, Self::Error> {
      self.inner.latest_snapshots(group_id, since).await
    }

    async fn latest_snapshot(
      &self,
      id: Uuid,
    ) -> Result<Option<TrendingSnapshot>, Self::Error> {
      self.inner.latest_snapshot(id).await
    }

    async fn prune_snapshots(&self, before: DateTime<Utc>) -> Result<u64, Self::Error> {
      self.inner.prune_snapshots(before).await
    }

    async fn upsert_impact_index(&self, i: ImpactIndex) -> Result<(), Self::Error> {
      self.inner.upsert_impact_index(i).await
    }

    async fn get_impact_index(&self, id: Uuid) -> Result<Option<ImpactIndex>, Self::Error> {
      self.inner.get_impact_index(id).await
    }

    async fn upsert_user_impact(&self, u: UserImpact) -> Result<(), Self::Error> {
      self.inner.upsert_user_impact(u).await
    }

    async fn get_user_impact(&self, id: Uuid) -> Result<Option<UserImpact>, Self::Error> {
      self.inner.get_user_impact(id).await
    }
  }

  fn bump(current: Option<&Summary>, id: Uuid) -> SummaryDraft {
    let mut draft = SummaryDraft::from_current(id, current);
    draft.actions_total += 1;
    draft
  }

  #[tokio::test]
  async fn commits_first_try_without_contention() {
    let store = Contended::new(0).await;
    let id = Uuid::new_v4();
    let outcome = update_summary(&store, id, 3, |c| bump(c, id)).await.unwrap();
    let RetryOutcome::Committed(summary) = outcome else {
      panic!("expected commit");
    };
    assert_eq!(summary.version, 1);
    assert_eq!(summary.actions_total, 1);
  }

  #[tokio::test]
  async fn retries_through_conflicts() {
    let store = Contended::new(2).await;
    let id = Uuid::new_v4();
    let outcome = update_summary(&store, id, 3, |c| bump(c, id)).await.unwrap();
    assert!(matches!(outcome, RetryOutcome::Committed(_)));
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let store = Contended::new(10).await;
    let id = Uuid::new_v4();
    let outcome = update_summary(&store, id, 3, |c| bump(c, id)).await.unwrap();
    assert_eq!(outcome, RetryOutcome::GaveUp);
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
    assert!(store.get_summary(id).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn each_attempt_sees_the_latest_row() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let id = Uuid::new_v4();
    for _ in 0..3 {
      update_summary(&store, id, 3, |c| bump(c, id)).await.unwrap();
    }
    let stored = store.get_summary(id).await.unwrap().unwrap();
    assert_eq!(stored.actions_total, 3);
    assert_eq!(stored.version, 3);
  }

  #[tokio::test]
  async fn interleaved_writers_both_land() {
    let store = Contended::lockstep().await;
    let id = Uuid::new_v4();

    // Both writers read "no row yet" before either writes.
    let (a, b) = tokio::join!(
      update_summary(&store, id, 3, |c| bump(c, id)),
      update_summary(&store, id, 3, |c| bump(c, id)),
    );
    assert!(matches!(a.unwrap(), RetryOutcome::Committed(_)));
    assert!(matches!(b.unwrap(), RetryOutcome::Committed(_)));
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);

    let stored = store.get_summary(id).await.unwrap().unwrap();
    assert_eq!(stored.actions_total, 2);
    assert_eq!(stored.version, 2);
  }
}
