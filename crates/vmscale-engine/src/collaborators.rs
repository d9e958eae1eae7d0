//! External collaborators consumed by the engine.
//!
//! Metric fetches and capacity changes cross a process boundary in any real
//! deployment, so both traits hand back boxed futures. The engine wraps every
//! call in a timeout; implementations do not need their own.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use vmscale_state::{AutoScaleVmGroup, Counter, GroupId, VmMember};

/// Future returned by collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Reports the current value of a counter for a group.
pub trait MetricProvider: Send + Sync {
    /// Latest value of `counter` observed for `group_id`.
    ///
    /// Called at most once per counter per tick.
    fn current_value<'a>(&'a self, counter: &'a Counter, group_id: GroupId) -> BoxFuture<'a, f64>;
}

/// Adds and removes group members.
pub trait CapacityManager: Send + Sync {
    /// Provision a member. Resolves once the member is registered with the
    /// group's load balancer; only then does it count toward membership.
    fn scale_up<'a>(&'a self, group: &'a AutoScaleVmGroup) -> BoxFuture<'a, VmMember>;

    /// Detach `member` from the load balancer and destroy it after `grace`.
    ///
    /// Resolves once the removal is scheduled, not when it completes.
    fn scale_down<'a>(
        &'a self,
        group: &'a AutoScaleVmGroup,
        member: &'a VmMember,
        grace: Duration,
    ) -> BoxFuture<'a, ()>;
}
