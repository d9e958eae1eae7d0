//! Group monitor: cooldown timestamps and bounded membership for one group.
//!
//! Owned by the group's tick task; nothing here is shared between groups.

use std::collections::HashMap;

use vmscale_state::{Action, AutoScalePolicy, AutoScaleVmGroup, GroupId, PolicyId};

/// Outcome of a bounded membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resize {
    Applied { from: u32, to: u32 },
    /// The change would leave `min_members..=max_members`.
    AtBound { count: u32, bound: u32 },
}

#[derive(Debug)]
pub struct GroupMonitor {
    group_id: GroupId,
    min_members: u32,
    max_members: u32,
    members: u32,
    last_fired: HashMap<PolicyId, u64>,
}

impl GroupMonitor {
    pub fn new(group: &AutoScaleVmGroup) -> Self {
        Self {
            group_id: group.id,
            min_members: group.min_members,
            max_members: group.max_members,
            members: group.member_count(),
            last_fired: HashMap::new(),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn member_count(&self) -> u32 {
        self.members
    }

    /// Pick up bounds and membership from a freshly loaded group.
    pub fn refresh(&mut self, group: &AutoScaleVmGroup) {
        self.min_members = group.min_members;
        self.max_members = group.max_members;
        self.members = group.member_count();
    }

    /// Seed the cooldown for `policy` from its persisted `last_quiet_time`
    /// unless the monitor already tracks it.
    pub fn track(&mut self, policy: &AutoScalePolicy) {
        if let Some(at) = policy.last_quiet_time {
            self.last_fired.entry(policy.id).or_insert(at);
        }
    }

    /// Drop cooldowns of policies no longer attached to the group.
    pub fn retain(&mut self, attached: &[PolicyId]) {
        self.last_fired.retain(|id, _| attached.contains(id));
    }

    pub fn last_fired(&self, policy_id: PolicyId) -> Option<u64> {
        self.last_fired.get(&policy_id).copied()
    }

    pub fn can_fire(&self, policy: &AutoScalePolicy, now: u64) -> bool {
        match self.last_fired(policy.id) {
            None => true,
            Some(at) => now.saturating_sub(at) >= policy.quiet_time_secs,
        }
    }

    pub fn record_fire(&mut self, policy_id: PolicyId, now: u64) {
        self.last_fired.insert(policy_id, now);
    }

    /// What `action` would do to membership, without applying it.
    pub fn plan(&self, action: Action) -> Resize {
        match action {
            Action::ScaleUp if self.members >= self.max_members => Resize::AtBound {
                count: self.members,
                bound: self.max_members,
            },
            Action::ScaleUp => Resize::Applied {
                from: self.members,
                to: self.members + 1,
            },
            Action::ScaleDown if self.members <= self.min_members => Resize::AtBound {
                count: self.members,
                bound: self.min_members,
            },
            Action::ScaleDown => Resize::Applied {
                from: self.members,
                to: self.members - 1,
            },
        }
    }

    /// Apply `action` to membership if it stays within bounds.
    pub fn resize(&mut self, action: Action) -> Resize {
        let resize = self.plan(action);
        if let Resize::Applied { to, .. } = resize {
            self.members = to;
        }
        resize
    }
}
