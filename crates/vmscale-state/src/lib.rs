//! vmscale-state: entity store for vmscale.
//!
//! Backed by [redb](https://docs.rs/redb), holds counters, conditions,
//! autoscale policies, VM groups and the latest metric samples.
//!
//! # Architecture
//!
//! All entities are JSON-serialized into redb's `&[u8]` value columns and
//! keyed by a `u64` id drawn from a per-table sequence inside the same write
//! transaction that inserts the row. Policy → condition map rows are keyed
//! `{policy_id}:{position}` and written in the policy's transaction; they
//! are a projection of `AutoScalePolicy::condition_ids`, never edited on
//! their own.
//!
//! Consumers depend on the [`Repository`] trait (the persistence port);
//! [`StateStore`] is its redb implementation. The store is `Clone` + `Send`
//! + `Sync` (backed by `Arc<Database>`) and can be shared across tasks.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::Repository;
pub use store::StateStore;
pub use types::*;
