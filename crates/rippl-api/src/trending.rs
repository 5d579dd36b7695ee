//! Handler for `/trending`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/trending` | Optional `?group_id=<uuid>&limit=<1..=50>` |

use axum::{
  Json,
  extract::{Query, State},
};
use rippl_core::store::{ActivityLog, CounterStore, SummaryStore};
use rippl_engine::read::TrendingEntry;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
  pub group_id: Option<Uuid>,
  pub limit:    Option<usize>,
}

/// `GET /trending[?group_id=<uuid>][&limit=<n>]`
///
/// An empty array means no trending data yet.
pub async fn list<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Query(params): Query<TrendingParams>,
) -> Json<Vec<TrendingEntry>>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
  Json(state.read.top_trending(params.group_id, limit).await)
}
