//! Test fixtures: a store wrapper that counts writes and can fail them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use vmscale_core::EngineConfig;
use vmscale_state::*;

use crate::context::{AccountType, CallContext};
use crate::manager::AutoScaleManager;

/// Wraps an in-memory `StateStore`, counting every persist call.
pub(crate) struct RecordingRepository {
    pub store: StateStore,
    pub counter_writes: AtomicUsize,
    pub condition_writes: AtomicUsize,
    pub policy_writes: AtomicUsize,
    pub group_writes: AtomicUsize,
    pub fail_policy_writes: AtomicBool,
}

impl RecordingRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: StateStore::open_in_memory().unwrap(),
            counter_writes: AtomicUsize::new(0),
            condition_writes: AtomicUsize::new(0),
            policy_writes: AtomicUsize::new(0),
            group_writes: AtomicUsize::new(0),
            fail_policy_writes: AtomicBool::new(false),
        })
    }

    pub fn writes(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl Repository for RecordingRepository {
    fn persist_counter(&self, counter: Counter) -> StateResult<Counter> {
        self.counter_writes.fetch_add(1, Ordering::SeqCst);
        self.store.persist_counter(counter)
    }

    fn find_counter(&self, id: CounterId) -> StateResult<Option<Counter>> {
        self.store.find_counter(id)
    }

    fn list_counters(&self) -> StateResult<Vec<Counter>> {
        self.store.list_counters()
    }

    fn persist_condition(&self, condition: Condition) -> StateResult<Condition> {
        self.condition_writes.fetch_add(1, Ordering::SeqCst);
        self.store.persist_condition(condition)
    }

    fn find_condition(&self, id: ConditionId) -> StateResult<Option<Condition>> {
        self.store.find_condition(id)
    }

    fn persist_policy(&self, policy: AutoScalePolicy) -> StateResult<AutoScalePolicy> {
        self.policy_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_policy_writes.load(Ordering::SeqCst) {
            return Err(StateError::Write("injected policy_conditions failure".to_string()));
        }
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
        self.group_writes.fetch_add(1, Ordering::SeqCst);
        self.store.persist_vm_group(group)
    }

    fn update_vm_group(&self, group: &AutoScaleVmGroup) -> StateResult<()> {
        self.group_writes.fetch_add(1, Ordering::SeqCst);
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

/// Account 2 in domain 1.
pub(crate) fn caller() -> CallContext {
    CallContext {
        user_id: 1,
        account_id: 2,
        domain_id: 1,
        account_type: AccountType::Normal,
    }
}

pub(crate) fn other_caller() -> CallContext {
    CallContext {
        user_id: 9,
        account_id: 5,
        domain_id: 1,
        account_type: AccountType::Normal,
    }
}

pub(crate) fn manager(repo: &Arc<RecordingRepository>) -> AutoScaleManager {
    let repo: Arc<dyn Repository> = repo.clone();
    AutoScaleManager::new(repo, &EngineConfig::default())
}
