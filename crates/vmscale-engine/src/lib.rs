//! vmscale-engine: the autoscale control loop.
//!
//! Per group and per policy the engine runs a small state machine:
//!
//! ```text
//! Idle ──breach──► Breaching{since} ──held ≥ duration, quiet time over──► Triggered{at}
//!  ▲                   │                                                      │
//!  └────clear tick─────┘◄──────────────breach on next tick (since = at)───────┘
//! ```
//!
//! A fire applies the policy's action through the [`CapacityManager`],
//! bounded by the group's `min_members..=max_members`. Hitting a bound is a
//! no-op that still starts the quiet period. Metric fetches and capacity
//! calls run under timeouts; a failed fetch makes the dependent policies
//! non-breaching for that tick only.
//!
//! [`ScalingDriver`] spawns one interval task per enabled group; groups tick
//! independently and share no mutable state.

pub mod collaborators;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod monitor;
pub mod scaler;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborators::{BoxFuture, CapacityManager, MetricProvider};
pub use driver::ScalingDriver;
pub use error::{CallError, EngineError, EngineResult};
pub use evaluator::BreachState;
pub use monitor::{GroupMonitor, Resize};
pub use scaler::{
    BoundsRepair, EngineSettings, GroupScaler, PolicyOutcome, PolicyReport, ScalingEngine,
    TickReport,
};
