//! Scaling engine: one tick of the control loop for one group.
//!
//! Each tick reloads the group and its policy graph from the store, brings
//! membership back inside `min_members..=max_members` if it has drifted,
//! fetches every referenced counter once, then walks the scale-up policies
//! followed by the scale-down policies. A policy fires when all of its conditions have
//! held continuously for its duration and its quiet time has elapsed. At
//! most one policy fires per tick; the others still advance their breach
//! windows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use vmscale_core::{ConfigError, EngineConfig};
use vmscale_state::*;

use crate::collaborators::{CapacityManager, MetricProvider};
use crate::error::{bounded, CallError, EngineError, EngineResult};
use crate::evaluator::{evaluate, BreachState};
use crate::monitor::{GroupMonitor, Resize};

/// Timeouts applied to collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub fetch_timeout: Duration,
    pub action_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            fetch_timeout: config.fetch_timeout()?,
            action_timeout: config.action_timeout()?,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            action_timeout: Duration::from_secs(120),
        }
    }
}

/// Shared handles the per-group scalers evaluate against.
#[derive(Clone)]
pub struct ScalingEngine {
    repo: Arc<dyn Repository>,
    metrics: Arc<dyn MetricProvider>,
    capacity: Arc<dyn CapacityManager>,
    settings: EngineSettings,
}

impl ScalingEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        metrics: Arc<dyn MetricProvider>,
        capacity: Arc<dyn CapacityManager>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repo,
            metrics,
            capacity,
            settings,
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// A fresh scaler for `group_id` with no breach or cooldown history
    /// beyond what the store records.
    pub fn scaler(&self, group_id: GroupId) -> GroupScaler {
        GroupScaler {
            engine: self.clone(),
            group_id,
            monitor: None,
            breaches: HashMap::new(),
            interval: None,
        }
    }
}

/// What a policy did on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    /// Not breaching; the breach window is reset.
    Idle,
    /// Breaching since `since` but not yet eligible to fire.
    Breaching { since: u64 },
    /// Would fire but the quiet time since `last_fired` has not elapsed.
    Suppressed { last_fired: u64 },
    Fired { from: u32, to: u32 },
    /// Fired at a membership bound: no change, cooldown recorded.
    BoundNoOp { count: u32, bound: u32 },
    /// The capacity collaborator failed: no change, cooldown recorded.
    DispatchFailed { error: CallError },
}

impl PolicyOutcome {
    pub fn fired(&self) -> bool {
        matches!(
            self,
            PolicyOutcome::Fired { .. }
                | PolicyOutcome::BoundNoOp { .. }
                | PolicyOutcome::DispatchFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyReport {
    pub policy_id: PolicyId,
    pub action: Action,
    pub breaching: bool,
    pub outcome: PolicyOutcome,
    /// Lookup and fetch failures that made this policy non-breaching.
    pub errors: Vec<String>,
}

/// Membership moved back toward the group's bounds before policies ran.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsRepair {
    pub from: u32,
    pub to: u32,
    /// The capacity call that stopped the repair short, if any.
    pub error: Option<CallError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub group_id: GroupId,
    pub at: u64,
    /// Membership after the tick.
    pub members: u32,
    pub repair: Option<BoundsRepair>,
    pub policies: Vec<PolicyReport>,
}

impl TickReport {
    /// The policy that fired this tick, if any.
    pub fn fired(&self) -> Option<&PolicyReport> {
        self.policies.iter().find(|p| p.outcome.fired())
    }

    pub fn policy(&self, id: PolicyId) -> Option<&PolicyReport> {
        self.policies.iter().find(|p| p.policy_id == id)
    }
}

/// A policy with its conditions resolved, or the reason it could not be.
struct LoadedPolicy {
    policy: AutoScalePolicy,
    conditions: Vec<(Condition, CounterId)>,
    errors: Vec<String>,
}

/// Engine-owned state for one group, carried across ticks.
pub struct GroupScaler {
    engine: ScalingEngine,
    group_id: GroupId,
    monitor: Option<GroupMonitor>,
    breaches: HashMap<PolicyId, BreachState>,
    interval: Option<Duration>,
}

impl GroupScaler {
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Evaluation period of the group as of the last tick.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn breach_state(&self, policy_id: PolicyId) -> BreachState {
        self.breaches.get(&policy_id).copied().unwrap_or_default()
    }

    pub fn monitor(&self) -> Option<&GroupMonitor> {
        self.monitor.as_ref()
    }

    /// Load the group so `interval()` is known before the first tick.
    pub fn prime(&mut self) -> EngineResult<()> {
        let group = self.load_group()?;
        self.interval = Some(Duration::from_secs(group.interval_secs));
        Ok(())
    }

    /// Run one evaluation at time `now` (epoch seconds).
    pub async fn tick(&mut self, now: u64) -> EngineResult<TickReport> {
        let mut group = self.load_group()?;
        self.interval = Some(Duration::from_secs(group.interval_secs));

        let policies = self.load_policies(&group)?;
        let repair = self.repair_bounds(&mut group, now).await?;
        let values = self.fetch_counters(&group, &policies).await;

        let monitor = self.monitor.get_or_insert_with(|| GroupMonitor::new(&group));
        monitor.refresh(&group);
        let attached: Vec<PolicyId> = group.policy_ids().collect();
        monitor.retain(&attached);
        self.breaches.retain(|id, _| attached.contains(id));

        let mut reports = Vec::with_capacity(policies.len());
        // A repair that moved membership is this tick's one change.
        let mut fired = repair.as_ref().is_some_and(|r| r.from != r.to);

        for loaded in policies {
            let LoadedPolicy {
                policy,
                conditions,
                mut errors,
            } = loaded;
            self.track(&policy);

            let breaching = errors.is_empty()
                && !conditions.is_empty()
                && conditions.iter().all(|(condition, counter_id)| {
                    match values.get(counter_id) {
                        Some(Ok(value)) => evaluate(condition, *value),
                        Some(Err(e)) => {
                            errors.push(format!("counter {counter_id}: {e}"));
                            false
                        }
                        None => false,
                    }
                });

            let state = self.breach_state(policy.id).observe(breaching, now);
            self.breaches.insert(policy.id, state);

            let outcome = match state {
                BreachState::Breaching { since } if fired || !state.sustained(policy.duration_secs, now) => {
                    PolicyOutcome::Breaching { since }
                }
                BreachState::Breaching { since } => match self.last_fired_if_cooling(&policy, now) {
                    Some(last_fired) => {
                        debug!(
                            group = self.group_id,
                            policy = policy.id,
                            since,
                            last_fired,
                            quiet_time = policy.quiet_time_secs,
                            "fire suppressed by quiet time"
                        );
                        PolicyOutcome::Suppressed { last_fired }
                    }
                    None => {
                        fired = true;
                        self.breaches.insert(policy.id, BreachState::Triggered { at: now });
                        self.fire(&group, &policy, now).await?
                    }
                },
                _ => PolicyOutcome::Idle,
            };

            reports.push(PolicyReport {
                policy_id: policy.id,
                action: policy.action,
                breaching,
                outcome,
                errors,
            });
        }

        let members = self.monitor.as_ref().map_or(0, GroupMonitor::member_count);
        debug!(group = self.group_id, members, policies = reports.len(), "tick complete");
        Ok(TickReport {
            group_id: self.group_id,
            at: now,
            members,
            repair,
            policies: reports,
        })
    }

    fn load_group(&self) -> EngineResult<AutoScaleVmGroup> {
        let group = self
            .engine
            .repo
            .find_vm_group(self.group_id)?
            .ok_or(EngineError::GroupNotFound(self.group_id))?;
        if group.state == GroupState::Disabled {
            return Err(EngineError::GroupDisabled(self.group_id));
        }
        Ok(group)
    }

    /// Resolve every attached policy's conditions. Missing records are
    /// reported against the policy; store failures abort the tick.
    fn load_policies(&self, group: &AutoScaleVmGroup) -> EngineResult<Vec<LoadedPolicy>> {
        let repo = &self.engine.repo;
        let mut loaded = Vec::new();

        for policy_id in group.policy_ids() {
            let Some(policy) = repo.find_policy(policy_id)? else {
                warn!(group = group.id, policy = policy_id, "attached policy not found");
                continue;
            };

            let mut conditions = Vec::with_capacity(policy.condition_ids.len());
            let mut errors = Vec::new();
            for condition_id in &policy.condition_ids {
                match repo.find_condition(*condition_id)? {
                    Some(condition) => {
                        let counter_id = condition.counter_id;
                        conditions.push((condition, counter_id));
                    }
                    None => errors.push(format!("condition {condition_id} not found")),
                }
            }
            loaded.push(LoadedPolicy {
                policy,
                conditions,
                errors,
            });
        }
        Ok(loaded)
    }

    /// Fetch each distinct counter once, bounded by the fetch timeout.
    async fn fetch_counters(
        &self,
        group: &AutoScaleVmGroup,
        policies: &[LoadedPolicy],
    ) -> HashMap<CounterId, Result<f64, String>> {
        let mut values = HashMap::new();
        let counter_ids: Vec<CounterId> = policies
            .iter()
            .flat_map(|p| p.conditions.iter().map(|(_, counter_id)| *counter_id))
            .collect();

        for counter_id in counter_ids {
            if values.contains_key(&counter_id) {
                continue;
            }
            let value = match self.engine.repo.find_counter(counter_id) {
                Ok(Some(counter)) => bounded(
                    self.engine.settings.fetch_timeout,
                    self.engine.metrics.current_value(&counter, group.id),
                )
                .await
                .map_err(|e| e.to_string()),
                Ok(None) => Err("counter not found".to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(ref e) = value {
                warn!(group = group.id, counter = counter_id, error = %e, "metric fetch failed");
            }
            values.insert(counter_id, value);
        }
        values
    }

    /// Add or remove members one at a time until the count is inside
    /// `min_members..=max_members`. Stops at the first failed capacity call;
    /// the next tick tries again.
    async fn repair_bounds(
        &self,
        group: &mut AutoScaleVmGroup,
        now: u64,
    ) -> EngineResult<Option<BoundsRepair>> {
        let from = group.member_count();
        let action = if from < group.min_members {
            Action::ScaleUp
        } else if from > group.max_members {
            Action::ScaleDown
        } else {
            return Ok(None);
        };

        let mut failure = None;
        while out_of_bounds(group, action) {
            match self.dispatch(group, action).await {
                Ok(change) => *group = self.persist_membership(change, now)?,
                Err(e) => {
                    warn!(
                        group = group.id,
                        action = %action,
                        members = group.member_count(),
                        error = %e,
                        "membership repair stalled"
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        let to = group.member_count();
        info!(
            group = group.id,
            from,
            to,
            min = group.min_members,
            max = group.max_members,
            "membership repaired toward bounds"
        );
        Ok(Some(BoundsRepair {
            from,
            to,
            error: failure,
        }))
    }

    fn track(&mut self, policy: &AutoScalePolicy) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.track(policy);
        }
    }

    fn last_fired_if_cooling(&self, policy: &AutoScalePolicy, now: u64) -> Option<u64> {
        let monitor = self.monitor.as_ref()?;
        if monitor.can_fire(policy, now) {
            None
        } else {
            monitor.last_fired(policy.id)
        }
    }

    /// Apply `policy`'s action within bounds and record the fire.
    ///
    /// The cooldown is recorded before anything fallible runs, and
    /// `last_quiet_time` is written even when the membership write fails.
    async fn fire(
        &mut self,
        group: &AutoScaleVmGroup,
        policy: &AutoScalePolicy,
        now: u64,
    ) -> EngineResult<PolicyOutcome> {
        let Some(monitor) = self.monitor.as_mut() else {
            return Ok(PolicyOutcome::Idle);
        };
        let plan = monitor.plan(policy.action);
        monitor.record_fire(policy.id, now);

        let mut persisted = Ok(());
        let outcome = match plan {
            Resize::AtBound { count, bound } => {
                info!(
                    group = group.id,
                    policy = policy.id,
                    action = %policy.action,
                    count,
                    bound,
                    "policy fired at membership bound, no change"
                );
                PolicyOutcome::BoundNoOp { count, bound }
            }
            Resize::Applied { from, to } => match self.dispatch(group, policy.action).await {
                Ok(change) => {
                    if let Some(monitor) = self.monitor.as_mut() {
                        monitor.resize(policy.action);
                    }
                    persisted = self.persist_membership(change, now).map(drop);
                    info!(
                        group = group.id,
                        policy = policy.id,
                        action = %policy.action,
                        from,
                        to,
                        "policy fired"
                    );
                    PolicyOutcome::Fired { from, to }
                }
                Err(error) => {
                    warn!(
                        group = group.id,
                        policy = policy.id,
                        action = %policy.action,
                        error = %error,
                        "scaling action failed"
                    );
                    PolicyOutcome::DispatchFailed { error }
                }
            },
        };

        self.engine.repo.set_policy_last_quiet_time(policy.id, now)?;
        persisted?;
        Ok(outcome)
    }

    async fn dispatch(
        &self,
        group: &AutoScaleVmGroup,
        action: Action,
    ) -> Result<MembershipChange, CallError> {
        let limit = self.engine.settings.action_timeout;
        let capacity = &self.engine.capacity;
        match action {
            Action::ScaleUp => bounded(limit, capacity.scale_up(group))
                .await
                .map(MembershipChange::Joined),
            Action::ScaleDown => {
                let member = group
                    .members
                    .last()
                    .cloned()
                    .ok_or_else(|| CallError::Failed("group has no members to remove".to_string()))?;
                let grace = Duration::from_secs(group.destroy_vm_grace_period_secs);
                bounded(limit, capacity.scale_down(group, &member, grace)).await?;
                Ok(MembershipChange::Left(member))
            }
        }
    }

    /// Write the membership change against the latest stored group and
    /// return the group as stored.
    ///
    /// The capacity change already happened, so a failed write leaves a
    /// member the store does not know about; it is logged by id.
    fn persist_membership(
        &self,
        change: MembershipChange,
        now: u64,
    ) -> EngineResult<AutoScaleVmGroup> {
        self.write_membership(&change, now).inspect_err(|e| {
            error!(
                group = self.group_id,
                member = %change.member().vm_id,
                joined = matches!(change, MembershipChange::Joined(_)),
                error = %e,
                "membership change applied but not persisted"
            );
        })
    }

    fn write_membership(
        &self,
        change: &MembershipChange,
        now: u64,
    ) -> EngineResult<AutoScaleVmGroup> {
        let repo = &self.engine.repo;
        let mut group = repo
            .find_vm_group(self.group_id)?
            .ok_or(EngineError::GroupNotFound(self.group_id))?;
        match change {
            MembershipChange::Joined(member) => group.members.push(member.clone()),
            MembershipChange::Left(member) => group.members.retain(|m| m.vm_id != member.vm_id),
        }
        group.updated_at = now;
        repo.update_vm_group(&group)?;
        Ok(group)
    }
}

enum MembershipChange {
    Joined(VmMember),
    Left(VmMember),
}

impl MembershipChange {
    fn member(&self) -> &VmMember {
        match self {
            MembershipChange::Joined(member) | MembershipChange::Left(member) => member,
        }
    }
}

fn out_of_bounds(group: &AutoScaleVmGroup, action: Action) -> bool {
    match action {
        Action::ScaleUp => group.member_count() < group.min_members,
        Action::ScaleDown => group.member_count() > group.max_members,
    }
}
