//! Local collaborators for a single-host deployment.
//!
//! Metrics come from samples recorded in the store (`vmscaled metrics
//! record`). Capacity changes mint member ids locally and retire removed
//! members after their grace period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info};
use vmscale_core::epoch_secs;
use vmscale_engine::{BoxFuture, CapacityManager, MetricProvider};
use vmscale_state::{AutoScaleVmGroup, Counter, GroupId, StateStore, VmMember};

/// Serves the latest recorded sample for `(group, counter)`.
#[derive(Clone)]
pub struct StoreMetricProvider {
    store: StateStore,
}

impl StoreMetricProvider {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl MetricProvider for StoreMetricProvider {
    fn current_value<'a>(&'a self, counter: &'a Counter, group_id: GroupId) -> BoxFuture<'a, f64> {
        Box::pin(async move {
            let sample = self
                .store
                .latest_metric_sample(group_id, counter.id)?
                .ok_or_else(|| {
                    anyhow!(
                        "no {} sample recorded for counter {} in group {group_id}",
                        counter.source,
                        counter.id
                    )
                })?;
            debug!(
                group = group_id,
                counter = counter.id,
                value = sample.value,
                recorded_at = sample.recorded_at,
                "metric sample read"
            );
            Ok(sample.value)
        })
    }
}

/// Mints members locally and retires removed ones on a timer.
#[derive(Default)]
pub struct LocalCapacityManager {
    next: AtomicU64,
}

impl LocalCapacityManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CapacityManager for LocalCapacityManager {
    fn scale_up<'a>(&'a self, group: &'a AutoScaleVmGroup) -> BoxFuture<'a, VmMember> {
        Box::pin(async move {
            let now = epoch_secs();
            let seq = self.next.fetch_add(1, Ordering::SeqCst);
            let member = VmMember {
                vm_id: format!("vm-{}-{now}-{seq}", group.id),
                joined_at: now,
            };
            info!(
                group = group.id,
                vm = %member.vm_id,
                lb = group.load_balancer_id,
                port = group.member_port,
                "member registered"
            );
            Ok(member)
        })
    }

    fn scale_down<'a>(
        &'a self,
        group: &'a AutoScaleVmGroup,
        member: &'a VmMember,
        grace: Duration,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let group_id = group.id;
            let vm_id = member.vm_id.clone();
            info!(group = group_id, vm = %vm_id, grace_secs = grace.as_secs(), "member detached");
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                info!(group = group_id, vm = %vm_id, "member destroyed");
            });
            Ok(())
        })
    }
}
