//! The persistence port consumed by the builders and the scaling engine.

use crate::error::StateResult;
use crate::types::*;

/// Create/find operations on durable records.
///
/// `persist_*` methods take an entity whose `id` is zero, assign the next id
/// and return the stored record. Every error is fatal for the caller's
/// operation.
pub trait Repository: Send + Sync {
    fn persist_counter(&self, counter: Counter) -> StateResult<Counter>;

    fn find_counter(&self, id: CounterId) -> StateResult<Option<Counter>>;

    fn list_counters(&self) -> StateResult<Vec<Counter>>;

    fn persist_condition(&self, condition: Condition) -> StateResult<Condition>;

    fn find_condition(&self, id: ConditionId) -> StateResult<Option<Condition>>;

    /// Store a policy together with one map row per referenced condition.
    /// Either both land or neither does.
    fn persist_policy(&self, policy: AutoScalePolicy) -> StateResult<AutoScalePolicy>;

    fn find_policy(&self, id: PolicyId) -> StateResult<Option<AutoScalePolicy>>;

    /// Map rows for a policy, ordered by position.
    fn list_policy_conditions(&self, policy_id: PolicyId) -> StateResult<Vec<PolicyConditionMap>>;

    fn set_policy_last_quiet_time(&self, id: PolicyId, at: u64) -> StateResult<()>;

    fn persist_vm_group(&self, group: AutoScaleVmGroup) -> StateResult<AutoScaleVmGroup>;

    /// Overwrite an existing group. Fails with `NotFound` if the id is unknown.
    fn update_vm_group(&self, group: &AutoScaleVmGroup) -> StateResult<()>;

    fn find_vm_group(&self, id: GroupId) -> StateResult<Option<AutoScaleVmGroup>>;

    fn list_vm_groups(&self) -> StateResult<Vec<AutoScaleVmGroup>>;

    fn delete_vm_group(&self, id: GroupId) -> StateResult<bool>;
}
