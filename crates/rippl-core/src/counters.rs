//! The per-entity counter hash kept in the [`CounterStore`].
//!
//! Values in the counter store are plain `f64`s keyed by field name.
//! Timestamps are epoch milliseconds. [`EntityCounters`] is the typed view;
//! parsing rejects values no well-behaved writer can produce.
//!
//! [`CounterStore`]: crate::store::CounterStore

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, stats};

pub const PARTICIPANTS_TOTAL: &str = "participants_total";
pub const ACTIONS_24H: &str = "actions_24h";
pub const ACTIONS_1H: &str = "actions_1h";
pub const NEW_PARTICIPANTS_24H: &str = "new_participants_24h";
pub const BOOST: &str = "boost";
pub const LAST_BOOST_TS: &str = "last_boost_ts";
pub const TOP_TEN_SINCE: &str = "top_ten_since";

/// Typed view of an entity's counter hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCounters {
  pub participants_total:   u64,
  pub actions_24h:          u64,
  pub actions_1h:           u64,
  pub new_participants_24h: u64,
  /// Boost as last written; see [`EntityCounters::boost_at`] for the
  /// decayed value.
  pub boost:                f64,
  pub last_boost_ts:        Option<DateTime<Utc>>,
  pub top_ten_since:        Option<DateTime<Utc>>,
}

impl EntityCounters {
  /// Parse a raw hash. Missing fields default to zero / absent.
  pub fn from_fields(fields: &HashMap<String, f64>) -> Result<Self> {
    Ok(Self {
      participants_total:   count(fields, PARTICIPANTS_TOTAL)?,
      actions_24h:          count(fields, ACTIONS_24H)?,
      actions_1h:           count(fields, ACTIONS_1H)?,
      new_participants_24h: count(fields, NEW_PARTICIPANTS_24H)?,
      boost:                non_negative(fields, BOOST)?,
      last_boost_ts:        timestamp(fields, LAST_BOOST_TS)?,
      top_ten_since:        timestamp(fields, TOP_TEN_SINCE)?,
    })
  }

  /// Boost decayed from `last_boost_ts` to `now` with the given half-life.
  /// Without a boost timestamp the boost reads as zero.
  pub fn boost_at(&self, now: DateTime<Utc>, half_life_secs: f64) -> f64 {
    match self.last_boost_ts {
      Some(ts) if self.boost > 0.0 => {
        let elapsed = (now - ts).num_milliseconds() as f64 / 1000.0;
        stats::decay(self.boost, elapsed, half_life_secs)
      }
      _ => 0.0,
    }
  }
}

pub fn encode_ts(ts: DateTime<Utc>) -> f64 { ts.timestamp_millis() as f64 }

pub fn decode_ts(ms: f64) -> Option<DateTime<Utc>> {
  if !ms.is_finite() {
    return None;
  }
  DateTime::from_timestamp_millis(ms as i64)
}

fn non_negative(fields: &HashMap<String, f64>, field: &'static str) -> Result<f64> {
  match fields.get(field).copied() {
    None => Ok(0.0),
    Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
    Some(value) => Err(Error::InvalidCounter { field, value }),
  }
}

fn count(fields: &HashMap<String, f64>, field: &'static str) -> Result<u64> {
  non_negative(fields, field).map(|v| v.round() as u64)
}

fn timestamp(
  fields: &HashMap<String, f64>,
  field: &'static str,
) -> Result<Option<DateTime<Utc>>> {
  match fields.get(field).copied() {
    None => Ok(None),
    Some(value) => decode_ts(value)
      .map(Some)
      .ok_or(Error::InvalidTimestamp { field, value }),
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn fields(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
  }

  #[test]
  fn empty_hash_parses_to_zeroes() {
    let c = EntityCounters::from_fields(&HashMap::new()).unwrap();
    assert_eq!(c, EntityCounters::default());
  }

  #[test]
  fn negative_count_is_rejected() {
    let err = EntityCounters::from_fields(&fields(&[(ACTIONS_24H, -3.0)]))
      .unwrap_err();
    assert!(matches!(err, Error::InvalidCounter { field: ACTIONS_24H, .. }));
  }

  #[test]
  fn nan_boost_is_rejected() {
    assert!(EntityCounters::from_fields(&fields(&[(BOOST, f64::NAN)])).is_err());
  }

  #[test]
  fn boost_halves_after_one_half_life() {
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let c = EntityCounters::from_fields(&fields(&[
      (BOOST, 100.0),
      (LAST_BOOST_TS, encode_ts(t0)),
    ]))
    .unwrap();
    let later = t0 + Duration::seconds(7200);
    assert!((c.boost_at(later, 7200.0) - 50.0).abs() < 1e-9);
    assert_eq!(c.boost_at(t0, 7200.0), 100.0);
  }

  #[test]
  fn boost_without_timestamp_reads_zero() {
    let c = EntityCounters::from_fields(&fields(&[(BOOST, 40.0)])).unwrap();
    assert_eq!(c.boost_at(Utc::now(), 7200.0), 0.0);
  }

  #[test]
  fn timestamps_roundtrip_at_millisecond_precision() {
    let t = Utc.timestamp_millis_opt(1_740_830_400_123).unwrap();
    assert_eq!(decode_ts(encode_ts(t)), Some(t));
  }
}
