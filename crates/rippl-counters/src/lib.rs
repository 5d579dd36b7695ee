//! In-process [`CounterStore`] backend for Rippl.
//!
//! Keys live in a sharded concurrent map, so every operation is atomic for
//! the key it touches and contention is per shard, never global. Shard guards
//! are dropped before any future resolves.
//!
//! [`CounterStore`]: rippl_core::store::CounterStore

mod sorted;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_KEY_TTL, MemoryCounterStore};
