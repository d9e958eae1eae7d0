//! Policy builder: an action gated by conditions, a duration and a quiet time.

use std::collections::HashSet;

use tracing::{debug, info};
use vmscale_core::epoch_secs;
use vmscale_state::{Action, AutoScalePolicy, Condition, Owner, PolicyId};

use crate::commands::CreateAutoScalePolicy;
use crate::context::CallContext;
use crate::error::{AutoScaleError, AutoScaleResult};
use crate::manager::AutoScaleManager;

impl AutoScaleManager {
    /// Validate and persist an autoscale policy together with its
    /// condition map rows.
    ///
    /// Checks run in a fixed order: action, duration, quiet time, the shape
    /// of the condition list, owner, condition lookup, then ownership. The
    /// first failure aborts the whole operation before anything is written.
    pub fn create_autoscale_policy(
        &self,
        ctx: &CallContext,
        cmd: &CreateAutoScalePolicy,
    ) -> AutoScaleResult<AutoScalePolicy> {
        let policy = self.validate_policy(ctx, cmd).inspect_err(|e| {
            debug!(user = ctx.user_id, action = %cmd.action, error = %e, "policy rejected");
        })?;

        let policy = self.repo.persist_policy(policy)?;
        info!(
            policy = policy.id,
            action = %policy.action,
            duration = policy.duration_secs,
            quiet_time = policy.quiet_time_secs,
            conditions = ?policy.condition_ids,
            "autoscale policy created"
        );
        Ok(policy)
    }

    pub fn find_policy(&self, id: PolicyId) -> AutoScaleResult<AutoScalePolicy> {
        self.repo
            .find_policy(id)?
            .ok_or(AutoScaleError::NotFound { entity: "policy", id })
    }

    fn validate_policy(
        &self,
        ctx: &CallContext,
        cmd: &CreateAutoScalePolicy,
    ) -> AutoScaleResult<AutoScalePolicy> {
        let action: Action = cmd.action.parse()?;
        let duration_secs = self.validate_duration(cmd.duration)?;
        let quiet_time_secs = match cmd.quiet_time {
            Some(q) if q < 0 => {
                return Err(AutoScaleError::invalid(
                    "quiettime",
                    format!("quiet time must not be negative, got {q}"),
                ));
            }
            Some(q) => q as u64,
            None => self.default_quiet_time_secs,
        };

        if cmd.condition_ids.is_empty() {
            return Err(AutoScaleError::invalid(
                "conditionids",
                "a policy needs at least one condition",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = cmd.condition_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AutoScaleError::invalid(
                "conditionids",
                format!("condition {dup} is listed more than once"),
            ));
        }

        let owner = self
            .owners
            .finalize_owner(ctx, cmd.account_id, cmd.domain_id, None)?;

        let conditions = cmd
            .condition_ids
            .iter()
            .map(|id| self.find_condition(*id))
            .collect::<AutoScaleResult<Vec<_>>>()?;

        check_ownership(&conditions, owner)?;
        check_distinct_counters(&conditions)?;

        Ok(AutoScalePolicy {
            id: 0,
            action,
            duration_secs,
            quiet_time_secs,
            last_quiet_time: None,
            condition_ids: cmd.condition_ids.clone(),
            owner,
            created_at: epoch_secs(),
        })
    }

    fn validate_duration(&self, duration: i64) -> AutoScaleResult<u64> {
        if duration <= 0 {
            return Err(AutoScaleError::invalid(
                "duration",
                format!("duration must be a positive number of seconds, got {duration}"),
            ));
        }
        let duration = duration as u64;
        if duration < self.min_duration_secs {
            return Err(AutoScaleError::invalid(
                "duration",
                format!(
                    "duration must be at least {} seconds, got {duration}",
                    self.min_duration_secs
                ),
            ));
        }
        Ok(duration)
    }
}

/// Every condition must belong to the policy owner's account and domain.
fn check_ownership(conditions: &[Condition], owner: Owner) -> AutoScaleResult<()> {
    match conditions.iter().find(|c| c.owner != owner) {
        Some(c) => Err(AutoScaleError::invalid(
            "conditionids",
            format!(
                "condition {} belongs to account {} in domain {}, not account {} in domain {}",
                c.id, c.owner.account_id, c.owner.domain_id, owner.account_id, owner.domain_id
            ),
        )),
        None => Ok(()),
    }
}

fn check_distinct_counters(conditions: &[Condition]) -> AutoScaleResult<()> {
    let mut counters = HashSet::new();
    match conditions.iter().find(|c| !counters.insert(c.counter_id)) {
        Some(c) => Err(AutoScaleError::invalid(
            "conditionids",
            format!(
                "condition {} uses counter {} which another condition of this policy already uses",
                c.id, c.counter_id
            ),
        )),
        None => Ok(()),
    }
}
