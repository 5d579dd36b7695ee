//! Counter-store key layout. Every key is namespaced per entity or per
//! leaderboard so no operation needs cross-entity locking.

use uuid::Uuid;

/// Hash of [`crate::counters`] fields for one entity.
pub fn entity(entity_id: Uuid) -> String { format!("ripple:{entity_id}") }

/// Sorted set of action ids scored by epoch milliseconds.
pub fn action_window(entity_id: Uuid) -> String {
  format!("ripple:{entity_id}:actions")
}

/// Sorted set of joining user ids scored by epoch milliseconds.
pub fn join_window(entity_id: Uuid) -> String {
  format!("ripple:{entity_id}:joins")
}

/// Global trending leaderboard.
pub const GLOBAL_LEADERBOARD: &str = "trending:all";

/// Per-group trending leaderboard.
pub fn group_leaderboard(group_id: Uuid) -> String {
  format!("trending:group:{group_id}")
}

/// The leaderboard for an optional group filter.
pub fn leaderboard(group_id: Option<Uuid>) -> String {
  group_id.map_or_else(|| GLOBAL_LEADERBOARD.to_owned(), group_leaderboard)
}
