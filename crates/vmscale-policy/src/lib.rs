//! vmscale-policy: validation and creation of the autoscale configuration graph.
//!
//! Builds, in dependency order, the static records the scaling engine
//! consumes:
//!
//! ```text
//! CreateCounter ──► Counter            (provider/source compatibility)
//! CreateCondition ──► Condition        (counter exists, operator, threshold ≥ 0)
//! CreateAutoScalePolicy ──► Policy     (action, duration, conditions owned by caller)
//! CreateVmGroup ──► AutoScaleVmGroup   (bounds, policies match their direction)
//! ```
//!
//! Every operation validates all inputs before its single write; a rejected
//! command never leaves a partial record behind. The caller identity is an
//! explicit [`CallContext`] passed to each operation and resolved to an
//! [`Owner`](vmscale_state::Owner) through an [`OwnerResolver`].

pub mod commands;
pub mod condition;
pub mod context;
pub mod counter;
pub mod error;
pub mod group;
pub mod manager;
pub mod policy;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::*;
pub use context::{AccountType, CallContext, DefaultOwnerResolver, OwnerResolver};
pub use error::{AutoScaleError, AutoScaleResult};
pub use manager::AutoScaleManager;
