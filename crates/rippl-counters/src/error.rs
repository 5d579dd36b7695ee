//! Error type for `rippl-counters`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A hash operation was issued against a sorted-set key or vice versa.
  #[error("key {0:?} holds a different value type")]
  WrongType(String),

  #[error("score must be finite, got {0}")]
  NonFiniteScore(f64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
