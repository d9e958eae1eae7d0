//! Condition factory: threshold comparisons over a counter.

use tracing::{debug, info};
use vmscale_core::epoch_secs;
use vmscale_state::{Condition, ConditionId, Operator};

use crate::commands::CreateCondition;
use crate::context::CallContext;
use crate::error::{AutoScaleError, AutoScaleResult};
use crate::manager::AutoScaleManager;

impl AutoScaleManager {
    /// Validate and persist a condition owned by the resolved caller.
    pub fn create_condition(
        &self,
        ctx: &CallContext,
        cmd: &CreateCondition,
    ) -> AutoScaleResult<Condition> {
        let condition = self.validate_condition(ctx, cmd).inspect_err(|e| {
            debug!(user = ctx.user_id, counter = cmd.counter_id, error = %e, "condition rejected");
        })?;

        let condition = self.repo.persist_condition(condition)?;
        info!(
            condition = condition.id,
            counter = condition.counter_id,
            operator = %condition.operator,
            threshold = condition.threshold,
            account = condition.owner.account_id,
            "condition created"
        );
        Ok(condition)
    }

    pub fn find_condition(&self, id: ConditionId) -> AutoScaleResult<Condition> {
        self.repo
            .find_condition(id)?
            .ok_or(AutoScaleError::NotFound { entity: "condition", id })
    }

    fn validate_condition(
        &self,
        ctx: &CallContext,
        cmd: &CreateCondition,
    ) -> AutoScaleResult<Condition> {
        let counter = self.find_counter(cmd.counter_id)?;

        let operator: Operator = cmd.operator.parse()?;

        if !cmd.threshold.is_finite() {
            return Err(AutoScaleError::invalid(
                "threshold",
                format!("threshold must be a finite number, got {}", cmd.threshold),
            ));
        }
        if cmd.threshold < 0.0 {
            return Err(AutoScaleError::invalid(
                "threshold",
                format!("threshold must not be negative, got {}", cmd.threshold),
            ));
        }

        let owner = self
            .owners
            .finalize_owner(ctx, cmd.account_id, cmd.domain_id, cmd.project_id)?;

        Ok(Condition {
            id: 0,
            counter_id: counter.id,
            operator,
            threshold: cmd.threshold,
            owner,
            created_at: epoch_secs(),
        })
    }
}
