//! JSON REST API for Rippl.
//!
//! Exposes an axum [`Router`] over the engine's read service, scheduler, and
//! ingestion hook. Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rippl_api::api_router(state))
//! ```

pub mod activity;
pub mod admin;
pub mod error;
pub mod impact;
pub mod trending;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use rippl_core::store::{ActivityLog, CounterStore, SummaryStore};
use rippl_engine::{Engines, ImpactEngine, IngestHook, ReadService, Scheduler};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<C, L, S> {
  pub read:      Arc<ReadService<C, L, S>>,
  /// For on-demand recomputes outside the scheduled cycles.
  pub impact:    Arc<ImpactEngine<L, S>>,
  pub scheduler: Arc<Scheduler<Engines<C, L, S>>>,
  pub ingest:    IngestHook<C, L, S>,
  /// Appends from `/actions` and `/memberships` go straight to the log.
  pub log:       Arc<L>,
}

impl<C, L, S> Clone for AppState<C, L, S> {
  fn clone(&self) -> Self {
    Self {
      read:      self.read.clone(),
      impact:    self.impact.clone(),
      scheduler: self.scheduler.clone(),
      ingest:    self.ingest.clone(),
      log:       self.log.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<C, L, S>(state: AppState<C, L, S>) -> Router<()>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  Router::new()
    // Reads
    .route("/trending", get(trending::list::<C, L, S>))
    .route("/impact/entities/{id}", get(impact::entity::<C, L, S>))
    .route("/impact/users/{id}", get(impact::user::<C, L, S>))
    .route("/impact/groups/{id}", get(impact::group::<C, L, S>))
    // Admin
    .route("/admin/signals/{id}", get(admin::signals::<C, L, S>))
    .route("/admin/recompute", post(admin::recompute::<C, L, S>))
    .route("/admin/decay", post(admin::decay::<C, L, S>))
    .route(
      "/admin/impact/entities/{id}/refresh",
      post(admin::refresh_entity::<C, L, S>),
    )
    .route("/admin/impact/users/{id}/refresh", post(admin::refresh_user::<C, L, S>))
    // Ingestion
    .route("/actions", post(activity::record_action::<C, L, S>))
    .route(
      "/memberships",
      post(activity::join::<C, L, S>).delete(activity::leave::<C, L, S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use rippl_core::catalog::{Entity, EntityStatus, Group};
  use rippl_counters::MemoryCounterStore;
  use rippl_engine::{
    EngineConfig, ImpactEngine, TrendingEngine,
    config::IngestConfig,
  };
  use rippl_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  type TestState = AppState<MemoryCounterStore, SqliteStore, SqliteStore>;

  async fn make_state() -> (TestState, Entity) {
    let counters = Arc::new(MemoryCounterStore::default());
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let config = Arc::new(EngineConfig {
      ingest: IngestConfig { refresh_delay_ms: 0 },
      ..EngineConfig::default()
    });

    let group = store
      .put_group(Group {
        group_id:           Uuid::new_v4(),
        name:               "Environment".into(),
        impact_coefficient: 0.5,
        impact_unit:        "kg litter".into(),
        impact_source:      "field survey".into(),
        bucket_weights:     BTreeMap::from([("pick_up_litter".to_owned(), 1.0)]),
      })
      .await
      .unwrap();
    let entity = store
      .put_entity(Entity {
        entity_id:      Uuid::new_v4(),
        group_id:       group.group_id,
        title:          "Litter Free Fridays".into(),
        status:         EntityStatus::Active,
        default_bucket: "pick_up_litter".into(),
      })
      .await
      .unwrap();

    let impact = Arc::new(ImpactEngine::new(store.clone(), store.clone(), config.clone()));
    let trending = Arc::new(TrendingEngine::new(
      counters.clone(),
      store.clone(),
      store.clone(),
      config.clone(),
    ));
    let scheduler = Scheduler::new(
      Arc::new(Engines { trending, impact: impact.clone() }),
      config.schedule.clone(),
    );

    let state = AppState {
      read:      Arc::new(ReadService::new(
        counters.clone(),
        store.clone(),
        store.clone(),
        config.clone(),
      )),
      impact:    impact.clone(),
      scheduler: Arc::new(scheduler),
      ingest:    IngestHook::new(counters, impact, config),
      log:       store,
    };
    (state, entity)
  }

  async fn send(state: &TestState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(state.clone())
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  // ── Reads ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn trending_is_empty_before_any_cycle() {
    let (state, _) = make_state().await;
    let (status, body) = send(&state, "GET", "/trending?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
  }

  #[tokio::test]
  async fn impact_without_data_is_404() {
    let (state, entity) = make_state().await;
    let uri = format!("/impact/entities/{}", entity.entity_id);
    let (status, body) = send(&state, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("no impact data"));

    let uri = format!("/impact/users/{}", Uuid::new_v4());
    assert_eq!(send(&state, "GET", &uri, None).await.0, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn malformed_id_is_400() {
    let (state, _) = make_state().await;
    let (status, _) = send(&state, "GET", "/impact/entities/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Ingestion ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn action_for_unknown_entity_is_404() {
    let (state, _) = make_state().await;
    let body = json!({ "entity_id": Uuid::new_v4(), "user_id": Uuid::new_v4() });
    let (status, body) = send(&state, "POST", "/actions", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn action_is_recorded_with_default_bucket() {
    let (state, entity) = make_state().await;
    let body = json!({ "entity_id": entity.entity_id, "user_id": Uuid::new_v4() });
    let (status, body) = send(&state, "POST", "/actions", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["bucket"], "pick_up_litter");
    assert_eq!(state.log.count_actions(entity.entity_id, None).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn blank_bucket_is_rejected() {
    let (state, entity) = make_state().await;
    let body = json!({
      "entity_id": entity.entity_id,
      "user_id": Uuid::new_v4(),
      "bucket": "  ",
    });
    let (status, _) = send(&state, "POST", "/actions", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn membership_is_recorded() {
    let (state, entity) = make_state().await;
    let user = Uuid::new_v4();
    let body = json!({ "entity_id": entity.entity_id, "user_id": user });
    let (status, body) = send(&state, "POST", "/memberships", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_active"], true);
    assert_eq!(state.log.count_participants(entity.entity_id, None).await.unwrap(), 1);

    let stray = json!({ "entity_id": Uuid::new_v4(), "user_id": user });
    assert_eq!(
      send(&state, "POST", "/memberships", Some(stray)).await.0,
      StatusCode::NOT_FOUND
    );
  }

  #[tokio::test]
  async fn card_names_the_impact_source() {
    let (state, entity) = make_state().await;
    let body = json!({ "entity_id": entity.entity_id, "user_id": Uuid::new_v4() });
    send(&state, "POST", "/actions", Some(body)).await;
    send(&state, "POST", "/admin/recompute", None).await;

    let uri = format!("/impact/entities/{}", entity.entity_id);
    let (_, card) = send(&state, "GET", &uri, None).await;
    assert_eq!(card["impact_source"], "field survey");
  }

  #[tokio::test]
  async fn group_summary_lists_entities() {
    let (state, entity) = make_state().await;
    let user = Uuid::new_v4();
    let join = json!({ "entity_id": entity.entity_id, "user_id": user });
    send(&state, "POST", "/memberships", Some(join)).await;
    for _ in 0..2 {
      let body = json!({ "entity_id": entity.entity_id, "user_id": user });
      send(&state, "POST", "/actions", Some(body)).await;
    }

    let uri = format!("/impact/groups/{}", entity.group_id);
    let (status, summary) = send(&state, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["impact_source"], "field survey");
    assert_eq!(summary["impact_value"], 1.0);
    assert_eq!(summary["breakdown"][0]["title"], "Litter Free Fridays");

    let uri = format!("/impact/groups/{}?user_id={}", entity.group_id, Uuid::new_v4());
    let (_, mine) = send(&state, "GET", &uri, None).await;
    assert_eq!(mine["breakdown"], json!([]));

    let uri = format!("/impact/groups/{}", Uuid::new_v4());
    assert_eq!(send(&state, "GET", &uri, None).await.0, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn leaving_deactivates_the_membership() {
    let (state, entity) = make_state().await;
    let body = json!({ "entity_id": entity.entity_id, "user_id": Uuid::new_v4() });
    send(&state, "POST", "/memberships", Some(body.clone())).await;

    let (status, _) = send(&state, "DELETE", "/memberships", Some(body.clone())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(state.log.count_participants(entity.entity_id, None).await.unwrap(), 0);
    assert_eq!(
      send(&state, "DELETE", "/memberships", Some(body)).await.0,
      StatusCode::NOT_FOUND
    );
  }

  // ── Admin ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn recompute_then_read_impact() {
    let (state, entity) = make_state().await;
    for _ in 0..4 {
      let body = json!({ "entity_id": entity.entity_id, "user_id": Uuid::new_v4() });
      send(&state, "POST", "/actions", Some(body)).await;
    }

    let (status, outcomes) = send(&state, "POST", "/admin/recompute", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcomes[0]["outcome"], "completed");
    assert_eq!(outcomes[0]["job"], "impact");
    assert_eq!(outcomes[1]["job"], "trending");

    let uri = format!("/impact/entities/{}", entity.entity_id);
    let (status, card) = send(&state, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["lifetime_value"], 2.0);
    assert_eq!(card["unit"], "kg litter");
    assert!(card["index"].is_null());
  }

  #[tokio::test]
  async fn decay_and_signals() {
    let (state, entity) = make_state().await;
    let (status, outcome) = send(&state, "POST", "/admin/decay", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "completed");
    assert_eq!(outcome["job"], "decay");

    let uri = format!("/admin/signals/{}", entity.entity_id);
    let (status, dump) = send(&state, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dump["entity_id"], entity.entity_id.to_string());
    assert!(dump["global_rank"].is_null());
  }

  #[tokio::test]
  async fn refresh_routes_recompute_on_demand() {
    let (state, entity) = make_state().await;
    let user = Uuid::new_v4();
    let join = json!({ "entity_id": entity.entity_id, "user_id": user });
    send(&state, "POST", "/memberships", Some(join)).await;
    state
      .log
      .record_action(rippl_core::catalog::NewAction {
        entity_id:   entity.entity_id,
        user_id:     user,
        bucket:      None,
        occurred_at: None,
      })
      .await
      .unwrap();

    let uri = format!("/admin/impact/entities/{}/refresh", entity.entity_id);
    let (status, index) = send(&state, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(index["ripple_impact"], 0.5);

    let uri = format!("/admin/impact/users/{user}/refresh");
    let (status, impact) = send(&state, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(impact["total_actions"], 1);
    let (status, view) = send(&state, "GET", &format!("/impact/users/{user}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["value"], 0.5);

    let uri = format!("/admin/impact/entities/{}/refresh", Uuid::new_v4());
    assert_eq!(send(&state, "POST", &uri, None).await.0, StatusCode::NOT_FOUND);
  }
}
