//! [`MemoryCounterStore`]: the in-process implementation of
//! [`CounterStore`].

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use dashmap::DashMap;
use rippl_core::store::CounterStore;

use crate::{Error, Result, sorted::SortedSet};

/// Expiry applied to every key when a write first creates it.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(25 * 60 * 60);

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Value {
  Hash(HashMap<String, f64>),
  Sorted(SortedSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
  Hash,
  Sorted,
}

impl Value {
  fn empty(kind: Kind) -> Self {
    match kind {
      Kind::Hash => Self::Hash(HashMap::new()),
      Kind::Sorted => Self::Sorted(SortedSet::default()),
    }
  }
}

#[derive(Debug)]
struct Entry {
  value:      Value,
  expires_at: Option<Instant>,
}

impl Entry {
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A counter store held in process memory.
///
/// Clones share the same map.
#[derive(Clone)]
pub struct MemoryCounterStore {
  map:         Arc<DashMap<String, Entry>>,
  default_ttl: Duration,
}

impl Default for MemoryCounterStore {
  fn default() -> Self { Self::new(DEFAULT_KEY_TTL) }
}

impl MemoryCounterStore {
  pub fn new(default_ttl: Duration) -> Self {
    Self { map: Arc::new(DashMap::new()), default_ttl }
  }

  /// Number of keys currently held, expired or not.
  pub fn key_count(&self) -> usize { self.map.len() }

  /// Run `f` against the live value of `key`, creating it (with the default
  /// expiry) if it is absent or expired.
  fn write<R>(
    &self,
    key: &str,
    kind: Kind,
    f: impl FnOnce(&mut Value) -> Result<R>,
  ) -> Result<R> {
    let now = Instant::now();
    let fresh = || Entry {
      value:      Value::empty(kind),
      expires_at: Some(now + self.default_ttl),
    };

    let mut entry = self.map.entry(key.to_owned()).or_insert_with(fresh);
    if entry.is_expired(now) {
      *entry = fresh();
    }
    let matches = matches!(
      (&entry.value, kind),
      (Value::Hash(_), Kind::Hash) | (Value::Sorted(_), Kind::Sorted)
    );
    if !matches {
      return Err(Error::WrongType(key.to_owned()));
    }
    f(&mut entry.value)
  }

  /// Run `f` against the live value of `key`, or return `None` if there is
  /// none. Expired keys are evicted on the way.
  fn read<R>(
    &self,
    key: &str,
    f: impl FnOnce(&Value) -> Result<R>,
  ) -> Result<Option<R>> {
    let now = Instant::now();
    if let Some(entry) = self.map.get(key) {
      if !entry.is_expired(now) {
        return f(&entry.value).map(Some);
      }
    } else {
      return Ok(None);
    }
    // The shard guard is released by now; evict.
    self.map.remove_if(key, |_, e| e.is_expired(now));
    Ok(None)
  }

  /// Run `f` against the live entry of `key` without creating it. Expired
  /// keys are evicted and treated as absent.
  fn modify<R>(
    &self,
    key: &str,
    f: impl FnOnce(&mut Entry) -> Result<R>,
  ) -> Result<Option<R>> {
    let now = Instant::now();
    if let Some(mut entry) = self.map.get_mut(key) {
      if !entry.is_expired(now) {
        return f(&mut *entry).map(Some);
      }
    } else {
      return Ok(None);
    }
    self.map.remove_if(key, |_, e| e.is_expired(now));
    Ok(None)
  }

  fn check_score(score: f64) -> Result<()> {
    if score.is_finite() { Ok(()) } else { Err(Error::NonFiniteScore(score)) }
  }
}

fn wrong_type(key: &str) -> Error { Error::WrongType(key.to_owned()) }

// ─── CounterStore impl ───────────────────────────────────────────────────────

impl CounterStore for MemoryCounterStore {
  type Error = Error;

  // ── Hash fields ───────────────────────────────────────────────────────────

  async fn increment(&self, key: &str, field: &str, delta: f64) -> Result<f64> {
    Self::check_score(delta)?;
    self.write(key, Kind::Hash, |value| match value {
      Value::Hash(fields) => {
        let slot = fields.entry(field.to_owned()).or_insert(0.0);
        *slot += delta;
        Ok(*slot)
      }
      Value::Sorted(_) => Err(wrong_type(key)),
    })
  }

  async fn set_field(&self, key: &str, field: &str, value: f64) -> Result<()> {
    Self::check_score(value)?;
    self.write(key, Kind::Hash, |v| match v {
      Value::Hash(fields) => {
        fields.insert(field.to_owned(), value);
        Ok(())
      }
      Value::Sorted(_) => Err(wrong_type(key)),
    })
  }

  async fn remove_field(&self, key: &str, field: &str) -> Result<()> {
    self.modify(key, |entry| match &mut entry.value {
      Value::Hash(fields) => {
        fields.remove(field);
        Ok(())
      }
      Value::Sorted(_) => Err(wrong_type(key)),
    })?;
    Ok(())
  }

  async fn get_all(&self, key: &str) -> Result<HashMap<String, f64>> {
    let fields = self.read(key, |value| match value {
      Value::Hash(fields) => Ok(fields.clone()),
      Value::Sorted(_) => Err(wrong_type(key)),
    })?;
    Ok(fields.unwrap_or_default())
  }

  // ── Key lifecycle ─────────────────────────────────────────────────────────

  /// A no-op for absent or already expired keys.
  async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
    self.modify(key, |entry| {
      entry.expires_at = Some(Instant::now() + ttl);
      Ok(())
    })?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.map.remove(key);
    Ok(())
  }

  async fn purge_expired(&self) -> Result<u64> {
    let now = Instant::now();
    let before = self.map.len();
    self.map.retain(|_, entry| !entry.is_expired(now));
    Ok(before.saturating_sub(self.map.len()) as u64)
  }

  // ── Sorted sets ───────────────────────────────────────────────────────────

  async fn rank_update(&self, key: &str, member: &str, score: f64) -> Result<()> {
    Self::check_score(score)?;
    self.write(key, Kind::Sorted, |value| match value {
      Value::Sorted(set) => {
        set.insert(member, score);
        Ok(())
      }
      Value::Hash(_) => Err(wrong_type(key)),
    })
  }

  async fn rank_top(&self, key: &str, n: usize) -> Result<Vec<(String, f64)>> {
    let top = self.read(key, |value| match value {
      Value::Sorted(set) => Ok(set.top(n)),
      Value::Hash(_) => Err(wrong_type(key)),
    })?;
    Ok(top.unwrap_or_default())
  }

  async fn rank_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
    let score = self.read(key, |value| match value {
      Value::Sorted(set) => Ok(set.score(member)),
      Value::Hash(_) => Err(wrong_type(key)),
    })?;
    Ok(score.flatten())
  }

  async fn rank_count(&self, key: &str, min: f64, max: f64) -> Result<u64> {
    let count = self.read(key, |value| match value {
      Value::Sorted(set) => Ok(set.count_between(min, max)),
      Value::Hash(_) => Err(wrong_type(key)),
    })?;
    Ok(count.unwrap_or(0))
  }

  async fn rank_prune(&self, key: &str, max_score: f64) -> Result<u64> {
    let removed = self.modify(key, |entry| match &mut entry.value {
      Value::Sorted(set) => Ok(set.prune_through(max_score)),
      Value::Hash(_) => Err(wrong_type(key)),
    })?;
    Ok(removed.unwrap_or(0))
  }
}
