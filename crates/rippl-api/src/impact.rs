//! Handlers for `/impact` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/impact/entities/{id}` | 404 until the first impact run covers it |
//! | `GET`  | `/impact/users/{id}` | 404 until the user has recorded actions |
//! | `GET`  | `/impact/groups/{id}` | Live per-entity breakdown; optional `?user_id=<uuid>` |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rippl_core::store::{ActivityLog, CounterStore, SummaryStore};
use rippl_engine::{
  impact::GroupImpactSummary,
  read::{ImpactCard, UserImpactView},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `GET /impact/entities/{id}`
pub async fn entity<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ImpactCard>, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  let card = state
    .read
    .impact_card(id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("no impact data for entity {id}")))?;
  Ok(Json(card))
}

/// `GET /impact/users/{id}`
pub async fn user<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<UserImpactView>, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  let view = state
    .read
    .user_impact(id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("no impact data for user {id}")))?;
  Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct GroupParams {
  /// Restrict the breakdown to this user's memberships.
  pub user_id: Option<Uuid>,
}

/// `GET /impact/groups/{id}[?user_id=<uuid>]`
pub async fn group<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<GroupParams>,
) -> Result<Json<GroupImpactSummary>, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  let summary = state
    .impact
    .group_summary(id, params.user_id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("group {id} not found")))?;
  Ok(Json(summary))
}
