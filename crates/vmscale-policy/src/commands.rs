//! Administrative command payloads.
//!
//! Enum-like fields arrive as text and are parsed by the create operation,
//! so an unknown value is reported as an `InvalidParameter` naming the field.

use serde::{Deserialize, Serialize};
use vmscale_state::{AccountId, ConditionId, CounterId, DomainId, PolicyId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCounter {
    pub name: String,
    pub provider: String,
    pub source: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCondition {
    pub counter_id: CounterId,
    pub operator: String,
    pub threshold: f64,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    #[serde(default)]
    pub domain_id: Option<DomainId>,
    #[serde(default)]
    pub project_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAutoScalePolicy {
    pub condition_ids: Vec<ConditionId>,
    pub action: String,
    /// Seconds; signed so that out-of-range input reaches validation.
    pub duration: i64,
    #[serde(default)]
    pub quiet_time: Option<i64>,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    #[serde(default)]
    pub domain_id: Option<DomainId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVmGroup {
    pub load_balancer_id: u64,
    pub min_members: i64,
    pub max_members: i64,
    pub member_port: i64,
    pub interval: i64,
    #[serde(default)]
    pub destroy_vm_grace_period: i64,
    #[serde(default)]
    pub scale_up_policy_ids: Vec<PolicyId>,
    #[serde(default)]
    pub scale_down_policy_ids: Vec<PolicyId>,
}
