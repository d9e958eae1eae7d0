//! VM group creation and lifecycle.

use tracing::{debug, info};
use vmscale_core::epoch_secs;
use vmscale_state::{Action, AutoScaleVmGroup, GroupId, GroupState, Owner, PolicyId};

use crate::commands::CreateVmGroup;
use crate::context::CallContext;
use crate::error::{AutoScaleError, AutoScaleResult};
use crate::manager::AutoScaleManager;

impl AutoScaleManager {
    /// Validate and persist a VM group. The group starts empty and enabled.
    pub fn create_vm_group(
        &self,
        ctx: &CallContext,
        cmd: &CreateVmGroup,
    ) -> AutoScaleResult<AutoScaleVmGroup> {
        let group = self.validate_group(ctx, cmd).inspect_err(|e| {
            debug!(user = ctx.user_id, lb = cmd.load_balancer_id, error = %e, "vm group rejected");
        })?;

        let group = self.repo.persist_vm_group(group)?;
        info!(
            group = group.id,
            lb = group.load_balancer_id,
            min = group.min_members,
            max = group.max_members,
            interval = group.interval_secs,
            "vm group created"
        );
        Ok(group)
    }

    /// Look up a group the caller may access.
    pub fn find_vm_group(&self, ctx: &CallContext, id: GroupId) -> AutoScaleResult<AutoScaleVmGroup> {
        let group = self
            .repo
            .find_vm_group(id)?
            .ok_or(AutoScaleError::NotFound { entity: "vmgroup", id })?;
        if !ctx.can_access(group.owner) {
            return Err(AutoScaleError::PermissionDenied(format!(
                "account {} may not access vm group {id}",
                ctx.account_id
            )));
        }
        Ok(group)
    }

    /// Groups visible to the caller, in id order.
    pub fn list_vm_groups(&self, ctx: &CallContext) -> AutoScaleResult<Vec<AutoScaleVmGroup>> {
        Ok(self
            .repo
            .list_vm_groups()?
            .into_iter()
            .filter(|g| ctx.can_access(g.owner))
            .collect())
    }

    /// Enable or disable monitoring of a group. Setting the current state
    /// again is a no-op that still succeeds.
    pub fn set_vm_group_state(
        &self,
        ctx: &CallContext,
        id: GroupId,
        state: GroupState,
    ) -> AutoScaleResult<AutoScaleVmGroup> {
        let mut group = self.find_vm_group(ctx, id)?;
        if group.state == state {
            return Ok(group);
        }
        group.state = state;
        group.updated_at = epoch_secs();
        self.repo.update_vm_group(&group)?;
        info!(group = id, state = %state, "vm group state changed");
        Ok(group)
    }

    pub fn delete_vm_group(&self, ctx: &CallContext, id: GroupId) -> AutoScaleResult<()> {
        self.find_vm_group(ctx, id)?;
        self.repo.delete_vm_group(id)?;
        info!(group = id, "vm group deleted");
        Ok(())
    }

    fn validate_group(
        &self,
        ctx: &CallContext,
        cmd: &CreateVmGroup,
    ) -> AutoScaleResult<AutoScaleVmGroup> {
        if cmd.min_members < 0 {
            return Err(AutoScaleError::invalid(
                "minmembers",
                format!("min members must not be negative, got {}", cmd.min_members),
            ));
        }
        if cmd.max_members < 1 {
            return Err(AutoScaleError::invalid(
                "maxmembers",
                format!("max members must be at least 1, got {}", cmd.max_members),
            ));
        }
        if cmd.min_members > cmd.max_members {
            return Err(AutoScaleError::invalid(
                "minmembers",
                format!(
                    "min members {} exceeds max members {}",
                    cmd.min_members, cmd.max_members
                ),
            ));
        }
        let min_members = u32::try_from(cmd.min_members)
            .map_err(|_| AutoScaleError::invalid("minmembers", "min members out of range"))?;
        let max_members = u32::try_from(cmd.max_members)
            .map_err(|_| AutoScaleError::invalid("maxmembers", "max members out of range"))?;

        let member_port = u16::try_from(cmd.member_port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                AutoScaleError::invalid(
                    "memberport",
                    format!("member port must be in 1..=65535, got {}", cmd.member_port),
                )
            })?;

        if cmd.interval <= 0 {
            return Err(AutoScaleError::invalid(
                "interval",
                format!("interval must be a positive number of seconds, got {}", cmd.interval),
            ));
        }
        if cmd.destroy_vm_grace_period < 0 {
            return Err(AutoScaleError::invalid(
                "destroyvmgraceperiod",
                format!(
                    "grace period must not be negative, got {}",
                    cmd.destroy_vm_grace_period
                ),
            ));
        }

        if cmd.scale_up_policy_ids.is_empty() && cmd.scale_down_policy_ids.is_empty() {
            return Err(AutoScaleError::invalid(
                "scaleuppolicyids",
                "a vm group needs at least one scale-up or scale-down policy",
            ));
        }

        let owner = ctx.owner();
        self.check_policies(&cmd.scale_up_policy_ids, Action::ScaleUp, owner, "scaleuppolicyids")?;
        self.check_policies(
            &cmd.scale_down_policy_ids,
            Action::ScaleDown,
            owner,
            "scaledownpolicyids",
        )?;

        let now = epoch_secs();
        Ok(AutoScaleVmGroup {
            id: 0,
            load_balancer_id: cmd.load_balancer_id,
            min_members,
            max_members,
            member_port,
            interval_secs: cmd.interval as u64,
            destroy_vm_grace_period_secs: cmd.destroy_vm_grace_period as u64,
            scale_up_policy_ids: cmd.scale_up_policy_ids.clone(),
            scale_down_policy_ids: cmd.scale_down_policy_ids.clone(),
            members: Vec::new(),
            state: GroupState::Enabled,
            owner,
            created_at: now,
            updated_at: now,
        })
    }

    fn check_policies(
        &self,
        ids: &[PolicyId],
        expected: Action,
        owner: Owner,
        field: &'static str,
    ) -> AutoScaleResult<()> {
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(AutoScaleError::invalid(
                    field,
                    format!("policy {id} is listed more than once"),
                ));
            }
            let policy = self.find_policy(*id)?;
            if policy.action != expected {
                return Err(AutoScaleError::invalid(
                    field,
                    format!("policy {id} has action {}, expected {expected}", policy.action),
                ));
            }
            if policy.owner != owner {
                return Err(AutoScaleError::invalid(
                    field,
                    format!(
                        "policy {id} belongs to account {}, not account {}",
                        policy.owner.account_id, owner.account_id
                    ),
                ));
            }
        }
        Ok(())
    }
}
