//! Domain types for the vmscale entity store.
//!
//! Counters, conditions, autoscale policies and VM groups as persisted in
//! redb. Every enum-like field is a closed variant set with a `FromStr`
//! impl that rejects unknown text with [`InvalidValue`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CounterId = u64;
pub type ConditionId = u64;
pub type PolicyId = u64;
pub type GroupId = u64;
pub type AccountId = u64;
pub type DomainId = u64;

/// Rejected text for an enum-like field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field} '{value}', expected one of: {expected}")]
pub struct InvalidValue {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// The (account, domain) pair that owns an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub account_id: AccountId,
    pub domain_id: DomainId,
}

// ── Enums ─────────────────────────────────────────────────────────

/// Network element that reports counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    VirtualRouter,
    VpcVirtualRouter,
    Netscaler,
}

/// What a counter measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Cpu,
    Memory,
    /// Network counters read from the virtual router.
    VirtualRouter,
    Netscaler,
    Snmp,
}

/// Relational operator of a condition: `sample <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// What a policy does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    ScaleUp,
    ScaleDown,
}

/// Whether the engine monitors a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Enabled,
    Disabled,
}

impl Provider {
    pub const ALL: &'static str = "VirtualRouter, VpcVirtualRouter, Netscaler";

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::VirtualRouter => "VirtualRouter",
            Provider::VpcVirtualRouter => "VpcVirtualRouter",
            Provider::Netscaler => "Netscaler",
        }
    }

    /// Counter sources this provider can report.
    pub fn supported_sources(&self) -> &'static [Source] {
        match self {
            Provider::VirtualRouter | Provider::VpcVirtualRouter => {
                &[Source::Cpu, Source::Memory, Source::VirtualRouter]
            }
            Provider::Netscaler => &[Source::Netscaler, Source::Snmp],
        }
    }

    pub fn supports(&self, source: Source) -> bool {
        self.supported_sources().contains(&source)
    }
}

impl FromStr for Provider {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virtualrouter" => Ok(Provider::VirtualRouter),
            "vpcvirtualrouter" => Ok(Provider::VpcVirtualRouter),
            "netscaler" => Ok(Provider::Netscaler),
            _ => Err(InvalidValue {
                field: "provider",
                value: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

impl Source {
    pub const ALL: &'static str = "cpu, memory, virtualrouter, netscaler, snmp";

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cpu => "cpu",
            Source::Memory => "memory",
            Source::VirtualRouter => "virtualrouter",
            Source::Netscaler => "netscaler",
            Source::Snmp => "snmp",
        }
    }
}

impl FromStr for Source {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Source::Cpu),
            "memory" => Ok(Source::Memory),
            "virtualrouter" | "network" => Ok(Source::VirtualRouter),
            "netscaler" => Ok(Source::Netscaler),
            "snmp" => Ok(Source::Snmp),
            _ => Err(InvalidValue {
                field: "source",
                value: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

impl Operator {
    pub const ALL: &'static str = "EQ, GT, GE, LT, LE";

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Gt => "GT",
            Operator::Ge => "GE",
            Operator::Lt => "LT",
            Operator::Le => "LE",
        }
    }
}

impl FromStr for Operator {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "equal" => Ok(Operator::Eq),
            "gt" | "greaterthan" => Ok(Operator::Gt),
            "ge" | "greaterthanorequal" => Ok(Operator::Ge),
            "lt" | "lessthan" => Ok(Operator::Lt),
            "le" | "lessthanorequal" => Ok(Operator::Le),
            _ => Err(InvalidValue {
                field: "relationaloperator",
                value: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

impl Action {
    pub const ALL: &'static str = "ScaleUp, ScaleDown";

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ScaleUp => "ScaleUp",
            Action::ScaleDown => "ScaleDown",
        }
    }
}

impl FromStr for Action {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scaleup" => Ok(Action::ScaleUp),
            "scaledown" => Ok(Action::ScaleDown),
            _ => Err(InvalidValue {
                field: "action",
                value: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

impl GroupState {
    pub const ALL: &'static str = "Enabled, Disabled";

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Enabled => "Enabled",
            GroupState::Disabled => "Disabled",
        }
    }
}

impl FromStr for GroupState {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(GroupState::Enabled),
            "disabled" => Ok(GroupState::Disabled),
            _ => Err(InvalidValue {
                field: "state",
                value: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

display_as_str!(Provider, Source, Operator, Action, GroupState);

// ── Counter ───────────────────────────────────────────────────────

/// A named metric definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Counter {
    /// Zero until the store assigns one.
    pub id: CounterId,
    pub name: String,
    pub provider: Provider,
    pub source: Source,
    /// Provider-specific expression (OID, router counter name, ...).
    pub value: String,
    pub created_at: u64,
}

// ── Condition ─────────────────────────────────────────────────────

/// A threshold comparison over one counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub id: ConditionId,
    pub counter_id: CounterId,
    pub operator: Operator,
    pub threshold: f64,
    pub owner: Owner,
    pub created_at: u64,
}

// ── Policy ────────────────────────────────────────────────────────

/// An action gated by conditions, a sustained-breach duration and a quiet
/// period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoScalePolicy {
    pub id: PolicyId,
    pub action: Action,
    /// Seconds all conditions must hold continuously before firing.
    pub duration_secs: u64,
    /// Seconds after a fire during which the policy may not fire again.
    pub quiet_time_secs: u64,
    /// Unix timestamp of the last fire, if any.
    pub last_quiet_time: Option<u64>,
    /// Ordered condition references. The map table mirrors this list.
    pub condition_ids: Vec<ConditionId>,
    pub owner: Owner,
    pub created_at: u64,
}

/// Storage projection of one entry of `AutoScalePolicy::condition_ids`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConditionMap {
    pub policy_id: PolicyId,
    pub condition_id: ConditionId,
    pub position: u32,
}

// ── VM group ──────────────────────────────────────────────────────

/// A member VM registered behind the group's load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmMember {
    pub vm_id: String,
    pub joined_at: u64,
}

/// A bounded pool of VMs evaluated on a fixed interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoScaleVmGroup {
    pub id: GroupId,
    pub load_balancer_id: u64,
    pub min_members: u32,
    pub max_members: u32,
    pub member_port: u16,
    /// Evaluation period in seconds.
    pub interval_secs: u64,
    /// Seconds a scaled-down member keeps serving before it is destroyed.
    pub destroy_vm_grace_period_secs: u64,
    pub scale_up_policy_ids: Vec<PolicyId>,
    pub scale_down_policy_ids: Vec<PolicyId>,
    pub members: Vec<VmMember>,
    pub state: GroupState,
    pub owner: Owner,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Metrics ───────────────────────────────────────────────────────

/// Most recent value observed for a counter within a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub group_id: GroupId,
    pub counter_id: CounterId,
    pub value: f64,
    pub recorded_at: u64,
}

impl PolicyConditionMap {
    /// Build the composite key for the policy-conditions table.
    pub fn table_key(&self) -> String {
        format!("{}:{:06}", self.policy_id, self.position)
    }
}

impl AutoScaleVmGroup {
    /// Scale-up policies first, then scale-down policies.
    pub fn policy_ids(&self) -> impl Iterator<Item = PolicyId> + '_ {
        self.scale_up_policy_ids
            .iter()
            .chain(self.scale_down_policy_ids.iter())
            .copied()
    }

    pub fn member_count(&self) -> u32 {
        self.members.len() as u32
    }
}

impl MetricSample {
    /// Build the composite key for the metric-samples table.
    pub fn table_key(&self) -> String {
        sample_key(self.group_id, self.counter_id)
    }
}

pub(crate) fn sample_key(group_id: GroupId, counter_id: CounterId) -> String {
    format!("{group_id}:{counter_id}")
}
