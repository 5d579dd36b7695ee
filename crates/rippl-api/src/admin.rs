//! Operator endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/admin/signals/{id}` | Raw counters, decayed boost, rank, windows |
//! | `POST` | `/admin/recompute` | Impact then trending, now |
//! | `POST` | `/admin/decay` | Decay job, now |
//! | `POST` | `/admin/impact/entities/{id}/refresh` | One entity's summary and index; 404 if unknown |
//! | `POST` | `/admin/impact/users/{id}/refresh` | One user's rollup |
//!
//! Job runs triggered here share the scheduler's overlap guard, so a job
//! already in flight comes back as `"outcome": "skipped"`. The refreshes
//! bypass the scheduler.

use axum::{
  Json,
  extract::{Path, State},
};
use rippl_core::{
  aggregate::{ImpactIndex, UserImpact},
  store::{ActivityLog, CounterStore, SummaryStore},
};
use rippl_engine::{JobKind, JobOutcome, read::SignalDebug};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `GET /admin/signals/{id}`
pub async fn signals<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SignalDebug>, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  Ok(Json(state.read.signal_debug(id).await?))
}

/// `POST /admin/recompute`
pub async fn recompute<C, L, S>(
  State(state): State<AppState<C, L, S>>,
) -> Json<Vec<JobOutcome>>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  Json(state.scheduler.run_all_now().await)
}

/// `POST /admin/decay`
pub async fn decay<C, L, S>(State(state): State<AppState<C, L, S>>) -> Json<JobOutcome>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  Json(state.scheduler.run_now(JobKind::Decay).await)
}

/// `POST /admin/impact/entities/{id}/refresh`
pub async fn refresh_entity<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ImpactIndex>, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  let index = state
    .impact
    .refresh_entity(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))?;
  Ok(Json(index))
}

/// `POST /admin/impact/users/{id}/refresh`
pub async fn refresh_user<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<UserImpact>, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  Ok(Json(state.impact.refresh_user(id).await?))
}
