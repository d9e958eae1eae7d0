//! Test fixtures: scripted collaborators and a seeded in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vmscale_state::*;

use crate::collaborators::{BoxFuture, CapacityManager, MetricProvider};
use crate::scaler::{EngineSettings, ScalingEngine};

pub(crate) const CPU: CounterId = 1;
pub(crate) const MEMORY: CounterId = 2;

const OWNER: Owner = Owner {
    account_id: 2,
    domain_id: 1,
};

/// Serves scripted values per counter and counts fetches.
#[derive(Default)]
pub(crate) struct FakeMetrics {
    values: Mutex<HashMap<CounterId, Result<f64, String>>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeMetrics {
    pub fn set(&self, counter_id: CounterId, value: f64) {
        self.values.lock().unwrap().insert(counter_id, Ok(value));
    }

    pub fn fail(&self, counter_id: CounterId) {
        self.values
            .lock()
            .unwrap()
            .insert(counter_id, Err("provider unavailable".to_string()));
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Most fetches ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl MetricProvider for FakeMetrics {
    fn current_value<'a>(&'a self, counter: &'a Counter, _group_id: GroupId) -> BoxFuture<'a, f64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let value = self.values.lock().unwrap().get(&counter.id).cloned();
        let delay = *self.delay.lock().unwrap();
        Box::pin(async move {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match value {
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => Err(anyhow::anyhow!("no sample for counter {}", counter.id)),
            }
        })
    }
}

/// Records capacity calls; can be told to fail or stall.
#[derive(Default)]
pub(crate) struct FakeCapacity {
    pub scale_ups: AtomicUsize,
    pub scale_downs: AtomicUsize,
    pub fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    removed: Mutex<Vec<(String, Duration)>>,
}

impl FakeCapacity {
    pub fn ups(&self) -> usize {
        self.scale_ups.load(Ordering::SeqCst)
    }

    pub fn downs(&self) -> usize {
        self.scale_downs.load(Ordering::SeqCst)
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn removed(&self) -> Vec<(String, Duration)> {
        self.removed.lock().unwrap().clone()
    }
}

impl CapacityManager for FakeCapacity {
    fn scale_up<'a>(&'a self, group: &'a AutoScaleVmGroup) -> BoxFuture<'a, VmMember> {
        let n = self.scale_ups.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail.load(Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                anyhow::bail!("no capacity");
            }
            Ok(VmMember {
                vm_id: format!("vm-{}-new-{n}", group.id),
                joined_at: 0,
            })
        })
    }

    fn scale_down<'a>(
        &'a self,
        _group: &'a AutoScaleVmGroup,
        member: &'a VmMember,
        grace: Duration,
    ) -> BoxFuture<'a, ()> {
        self.scale_downs.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                anyhow::bail!("load balancer refused removal");
            }
            self.removed
                .lock()
                .unwrap()
                .push((member.vm_id.clone(), grace));
            Ok(())
        })
    }
}

/// Store seeded with a cpu counter (value 90) and a memory counter
/// (value 10).
pub(crate) struct Fixture {
    pub store: StateStore,
    pub metrics: Arc<FakeMetrics>,
    pub capacity: Arc<FakeCapacity>,
    pub settings: EngineSettings,
}

impl Fixture {
    pub fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        for (name, source) in [("cpu", Source::Cpu), ("memory", Source::Memory)] {
            store
                .persist_counter(Counter {
                    id: 0,
                    name: name.to_string(),
                    provider: Provider::VirtualRouter,
                    source,
                    value: name.to_string(),
                    created_at: 0,
                })
                .unwrap();
        }
        let metrics = Arc::new(FakeMetrics::default());
        metrics.set(CPU, 90.0);
        metrics.set(MEMORY, 10.0);
        Self {
            store,
            metrics,
            capacity: Arc::new(FakeCapacity::default()),
            settings: EngineSettings {
                fetch_timeout: Duration::from_millis(200),
                action_timeout: Duration::from_millis(200),
            },
        }
    }

    pub fn engine(&self) -> ScalingEngine {
        self.engine_with(Arc::new(self.store.clone()), self.settings)
    }

    pub fn engine_with(&self, repo: Arc<dyn Repository>, settings: EngineSettings) -> ScalingEngine {
        ScalingEngine::new(repo, self.metrics.clone(), self.capacity.clone(), settings)
    }

    /// The fixture's store behind a switch that fails group writes.
    pub fn flaky_store(&self) -> Arc<FlakyGroupWrites> {
        Arc::new(FlakyGroupWrites {
            store: self.store.clone(),
            fail: AtomicBool::new(false),
        })
    }

    pub fn condition(&self, counter_id: CounterId, operator: Operator, threshold: f64) -> ConditionId {
        self.store
            .persist_condition(Condition {
                id: 0,
                counter_id,
                operator,
                threshold,
                owner: OWNER,
                created_at: 0,
            })
            .unwrap()
            .id
    }

    pub fn policy(
        &self,
        action: Action,
        duration_secs: u64,
        quiet_time_secs: u64,
        condition_ids: Vec<ConditionId>,
    ) -> PolicyId {
        self.store
            .persist_policy(AutoScalePolicy {
                id: 0,
                action,
                duration_secs,
                quiet_time_secs,
                last_quiet_time: None,
                condition_ids,
                owner: OWNER,
                created_at: 0,
            })
            .unwrap()
            .id
    }

    pub fn group_with(
        &self,
        min_members: u32,
        max_members: u32,
        members: u32,
        up: Vec<PolicyId>,
        down: Vec<PolicyId>,
    ) -> GroupId {
        self.store
            .persist_vm_group(AutoScaleVmGroup {
                id: 0,
                load_balancer_id: 1,
                min_members,
                max_members,
                member_port: 8080,
                interval_secs: 30,
                destroy_vm_grace_period_secs: 60,
                scale_up_policy_ids: up,
                scale_down_policy_ids: down,
                members: (0..members)
                    .map(|i| VmMember {
                        vm_id: format!("vm-{i}"),
                        joined_at: 0,
                    })
                    .collect(),
                state: GroupState::Enabled,
                owner: OWNER,
                created_at: 0,
                updated_at: 0,
            })
            .unwrap()
            .id
    }

    /// Group with a single scale-up policy on `cpu > 80`.
    pub fn group(&self, min_members: u32, max_members: u32, members: u32, interval_secs: u64) -> GroupId {
        let condition = self.condition(CPU, Operator::Gt, 80.0);
        let policy = self.policy(Action::ScaleUp, 30, 30, vec![condition]);
        let id = self.group_with(min_members, max_members, members, vec![policy], vec![]);
        let mut group = self.store.find_vm_group(id).unwrap().unwrap();
        group.interval_secs = interval_secs;
        self.store.update_vm_group(&group).unwrap();
        id
    }

    pub fn members(&self, group_id: GroupId) -> Vec<String> {
        self.store
            .find_vm_group(group_id)
            .unwrap()
            .unwrap()
            .members
            .into_iter()
            .map(|m| m.vm_id)
            .collect()
    }
}

/// Delegates to a `StateStore`; `update_vm_group` fails while `fail` is set.
pub(crate) struct FlakyGroupWrites {
    store: StateStore,
    pub fail: AtomicBool,
}

impl Repository for FlakyGroupWrites {
    fn persist_counter(&self, counter: Counter) -> StateResult<Counter> {
        self.store.persist_counter(counter)
    }

    fn find_counter(&self, id: CounterId) -> StateResult<Option<Counter>> {
        self.store.find_counter(id)
    }

    fn list_counters(&self) -> StateResult<Vec<Counter>> {
        self.store.list_counters()
    }

    fn persist_condition(&self, condition: Condition) -> StateResult<Condition> {
        self.store.persist_condition(condition)
    }

    fn find_condition(&self, id: ConditionId) -> StateResult<Option<Condition>> {
        self.store.find_condition(id)
    }

    fn persist_policy(&self, policy: AutoScalePolicy) -> StateResult<AutoScalePolicy> {
        self.store.persist_policy(policy)
    }

    fn find_policy(&self, id: PolicyId) -> StateResult<Option<AutoScalePolicy>> {
        self.store.find_policy(id)
    }

    fn list_policy_conditions(&self, policy_id: PolicyId) -> StateResult<Vec<PolicyConditionMap>> {
        self.store.list_policy_conditions(policy_id)
    }

    fn set_policy_last_quiet_time(&self, id: PolicyId, at: u64) -> StateResult<()> {
        self.store.set_policy_last_quiet_time(id, at)
    }

    fn persist_vm_group(&self, group: AutoScaleVmGroup) -> StateResult<AutoScaleVmGroup> {
        self.store.persist_vm_group(group)
    }

    fn update_vm_group(&self, group: &AutoScaleVmGroup) -> StateResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StateError::Write("injected vm_groups failure".to_string()));
        }
        self.store.update_vm_group(group)
    }

    fn find_vm_group(&self, id: GroupId) -> StateResult<Option<AutoScaleVmGroup>> {
        self.store.find_vm_group(id)
    }

    fn list_vm_groups(&self) -> StateResult<Vec<AutoScaleVmGroup>> {
        self.store.list_vm_groups()
    }

    fn delete_vm_group(&self, id: GroupId) -> StateResult<bool> {
        self.store.delete_vm_group(id)
    }
}
