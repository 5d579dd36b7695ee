//! Core types and trait definitions for the Rippl aggregation engine.
//!
//! This crate is deliberately free of runtime, HTTP, and database
//! dependencies. Store backends and the engine depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod catalog;
pub mod counters;
pub mod error;
pub mod keys;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
