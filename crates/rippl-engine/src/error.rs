//! Error type for `rippl-engine`.
//!
//! Store failures are boxed so the engine stays generic over its backends.
//! None of these abort a cycle on their own; the engines log them per entity
//! and move on.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("counter store error: {0}")]
  Counter(#[source] BoxError),

  #[error("summary store error: {0}")]
  Summary(#[source] BoxError),

  #[error("activity log error: {0}")]
  Log(#[source] BoxError),

  /// Data that no well-behaved writer produces. The entity is skipped.
  #[error("invariant violated: {0}")]
  Invariant(#[from] rippl_core::Error),
}

impl EngineError {
  pub fn counter(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Counter(Box::new(e))
  }

  pub fn summary(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Summary(Box::new(e))
  }

  pub fn log(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Log(Box::new(e))
  }

  pub fn is_invariant(&self) -> bool { matches!(self, Self::Invariant(_)) }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
