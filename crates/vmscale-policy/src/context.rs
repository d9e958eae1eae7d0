//! Caller identity and owner resolution.

use serde::{Deserialize, Serialize};
use vmscale_state::{AccountId, DomainId, Owner};

use crate::error::{AutoScaleError, AutoScaleResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Normal,
    DomainAdmin,
    RootAdmin,
}

/// The account and user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub user_id: u64,
    pub account_id: AccountId,
    pub domain_id: DomainId,
    pub account_type: AccountType,
}

impl CallContext {
    pub fn owner(&self) -> Owner {
        Owner {
            account_id: self.account_id,
            domain_id: self.domain_id,
        }
    }

    pub fn is_root_admin(&self) -> bool {
        self.account_type == AccountType::RootAdmin
    }

    /// Whether this caller may act on records owned by `owner`.
    pub fn can_access(&self, owner: Owner) -> bool {
        match self.account_type {
            AccountType::RootAdmin => true,
            AccountType::DomainAdmin => owner.domain_id == self.domain_id,
            AccountType::Normal => owner == self.owner(),
        }
    }
}

/// Decides which owner a new record belongs to.
pub trait OwnerResolver: Send + Sync {
    fn finalize_owner(
        &self,
        caller: &CallContext,
        account_id: Option<AccountId>,
        domain_id: Option<DomainId>,
        project_id: Option<u64>,
    ) -> AutoScaleResult<Owner>;
}

/// Owner is the caller unless an admin names another account in a domain
/// it administers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOwnerResolver;

impl OwnerResolver for DefaultOwnerResolver {
    fn finalize_owner(
        &self,
        caller: &CallContext,
        account_id: Option<AccountId>,
        domain_id: Option<DomainId>,
        project_id: Option<u64>,
    ) -> AutoScaleResult<Owner> {
        if let Some(project_id) = project_id {
            return Err(AutoScaleError::invalid(
                "projectid",
                format!("project {project_id} cannot own autoscale records"),
            ));
        }

        match (account_id, domain_id) {
            (None, None) => Ok(caller.owner()),
            (Some(account_id), Some(domain_id)) => {
                let owner = Owner {
                    account_id,
                    domain_id,
                };
                if caller.can_access(owner) {
                    Ok(owner)
                } else {
                    Err(AutoScaleError::PermissionDenied(format!(
                        "account {} may not act for account {account_id} in domain {domain_id}",
                        caller.account_id
                    )))
                }
            }
            _ => Err(AutoScaleError::invalid(
                "account",
                "account and domainid must be specified together",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(account_type: AccountType) -> CallContext {
        CallContext {
            user_id: 1,
            account_id: 2,
            domain_id: 1,
            account_type,
        }
    }

    #[test]
    fn no_arguments_resolves_to_caller() {
        let owner = DefaultOwnerResolver
            .finalize_owner(&caller(AccountType::Normal), None, None, None)
            .unwrap();
        assert_eq!(owner, Owner { account_id: 2, domain_id: 1 });
    }

    #[test]
    fn normal_account_cannot_act_for_others() {
        let err = DefaultOwnerResolver
            .finalize_owner(&caller(AccountType::Normal), Some(3), Some(1), None)
            .unwrap_err();
        assert!(matches!(err, AutoScaleError::PermissionDenied(_)));
    }

    #[test]
    fn domain_admin_limited_to_own_domain() {
        let admin = caller(AccountType::DomainAdmin);
        assert!(DefaultOwnerResolver.finalize_owner(&admin, Some(3), Some(1), None).is_ok());
        assert!(DefaultOwnerResolver.finalize_owner(&admin, Some(3), Some(9), None).is_err());
    }

    #[test]
    fn root_admin_can_act_anywhere() {
        let owner = DefaultOwnerResolver
            .finalize_owner(&caller(AccountType::RootAdmin), Some(7), Some(9), None)
            .unwrap();
        assert_eq!(owner, Owner { account_id: 7, domain_id: 9 });
    }

    #[test]
    fn half_specified_owner_is_invalid() {
        let err = DefaultOwnerResolver
            .finalize_owner(&caller(AccountType::RootAdmin), Some(7), None, None)
            .unwrap_err();
        assert_eq!(err.field(), Some("account"));
    }

    #[test]
    fn projects_are_rejected() {
        let err = DefaultOwnerResolver
            .finalize_owner(&caller(AccountType::Normal), None, None, Some(5))
            .unwrap_err();
        assert_eq!(err.field(), Some("projectid"));
    }
}
