//! Ingestion endpoints: append to the activity log, then hand off to the
//! engine's hook.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/actions` | Body: `{"entity_id", "user_id", "bucket"?, "occurred_at"?}` |
//! | `POST` | `/memberships` | Body: `{"entity_id", "user_id", "joined_at"?}` |
//! | `DELETE` | `/memberships` | Body: `{"entity_id", "user_id"}`; 404 if not a member |
//!
//! The two appends return 201 once the log write commits. Counter updates
//! happen in the background and never affect the response. Leaving only
//! touches the log; the next trending cycle picks it up.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rippl_core::{
  catalog::NewAction,
  store::{ActivityLog, CounterStore, SummaryStore},
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

async fn require_entity<L: ActivityLog>(log: &L, entity_id: Uuid) -> Result<(), ApiError> {
  log
    .get_entity(entity_id)
    .await
    .map_err(ApiError::store)?
    .map(|_| ())
    .ok_or_else(|| ApiError::NotFound(format!("entity {entity_id} not found")))
}

// ─── Actions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActionBody {
  pub entity_id:   Uuid,
  pub user_id:     Uuid,
  pub bucket:      Option<String>,
  pub occurred_at: Option<DateTime<Utc>>,
}

/// `POST /actions`
pub async fn record_action<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Json(body): Json<ActionBody>,
) -> Result<impl IntoResponse, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  if body.bucket.as_deref().is_some_and(|b| b.trim().is_empty()) {
    return Err(ApiError::BadRequest("bucket must not be blank".into()));
  }
  require_entity(&*state.log, body.entity_id).await?;

  let event = state
    .log
    .record_action(NewAction {
      entity_id:   body.entity_id,
      user_id:     body.user_id,
      bucket:      body.bucket,
      occurred_at: body.occurred_at,
    })
    .await
    .map_err(ApiError::store)?;

  state.ingest.on_action_completed(event.clone());
  Ok((StatusCode::CREATED, Json(event)))
}

// ─── Memberships ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JoinBody {
  pub entity_id: Uuid,
  pub user_id:   Uuid,
  pub joined_at: Option<DateTime<Utc>>,
}

/// `POST /memberships`
pub async fn join<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Json(body): Json<JoinBody>,
) -> Result<impl IntoResponse, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  require_entity(&*state.log, body.entity_id).await?;

  let already_member = state
    .log
    .user_memberships(body.user_id)
    .await
    .map_err(ApiError::store)?
    .iter()
    .any(|m| m.entity_id == body.entity_id);

  let membership = state
    .log
    .join(body.user_id, body.entity_id, body.joined_at.unwrap_or_else(Utc::now))
    .await
    .map_err(ApiError::store)?;

  if already_member {
    debug!(entity_id = %body.entity_id, user_id = %body.user_id, "already a member");
  } else {
    state
      .ingest
      .on_member_joined(membership.entity_id, membership.user_id, membership.joined_at);
  }
  Ok((StatusCode::CREATED, Json(membership)))
}

#[derive(Debug, Deserialize)]
pub struct LeaveBody {
  pub entity_id: Uuid,
  pub user_id:   Uuid,
}

/// `DELETE /memberships`
pub async fn leave<C, L, S>(
  State(state): State<AppState<C, L, S>>,
  Json(body): Json<LeaveBody>,
) -> Result<StatusCode, ApiError>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  let left = state
    .log
    .leave(body.user_id, body.entity_id)
    .await
    .map_err(ApiError::store)?;
  if !left {
    return Err(ApiError::NotFound(format!(
      "user {} is not a member of entity {}",
      body.user_id, body.entity_id
    )));
  }
  debug!(entity_id = %body.entity_id, user_id = %body.user_id, "membership ended");
  Ok(StatusCode::NO_CONTENT)
}
