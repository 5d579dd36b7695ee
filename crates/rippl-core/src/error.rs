//! Error types for `rippl-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A counter field held a value no well-behaved writer can produce.
  #[error("invalid counter {field} = {value}")]
  InvalidCounter { field: &'static str, value: f64 },

  #[error("invalid timestamp in counter {field}: {value}")]
  InvalidTimestamp { field: &'static str, value: f64 },

  #[error("unknown entity status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
