//! SQLite backend for the Rippl activity log and summary store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. A single [`SqliteStore`] implements
//! both [`ActivityLog`] and [`SummaryStore`].
//!
//! [`ActivityLog`]: rippl_core::store::ActivityLog
//! [`SummaryStore`]: rippl_core::store::SummaryStore

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
