//! Error type for `rippl-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] rippl_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A count column held a negative value.
  #[error("negative count in column {column}: {value}")]
  NegativeCount { column: &'static str, value: i64 },

  #[error("entity not found: {0}")]
  EntityNotFound(uuid::Uuid),

  #[error("group not found: {0}")]
  GroupNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
