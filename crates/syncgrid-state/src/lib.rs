//! syncgrid-state — embedded state store for SyncGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for connector rollout records.
//!
//! # Architecture
//!
//! Rollout records are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by the rollout's UUID. Terminal rollouts are archived in place —
//! the store exposes no delete operation for them.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
