//! Errors returned by the create operations.

use thiserror::Error;
use vmscale_state::{InvalidValue, StateError};

/// Errors that can occur while building counters, conditions, policies and groups.
#[derive(Debug, Error)]
pub enum AutoScaleError {
    /// A field failed validation. Nothing was written.
    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// A referenced entity does not exist. Nothing was written.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The persistence port failed; surfaced untranslated.
    #[error(transparent)]
    State(#[from] StateError),
}

pub type AutoScaleResult<T> = Result<T, AutoScaleError>;

impl AutoScaleError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        AutoScaleError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    /// The parameter a validation or lookup failure names, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            AutoScaleError::InvalidParameter { field, .. } => Some(*field),
            AutoScaleError::NotFound { entity, .. } => Some(*entity),
            _ => None,
        }
    }
}

impl From<InvalidValue> for AutoScaleError {
    fn from(err: InvalidValue) -> Self {
        AutoScaleError::InvalidParameter {
            field: err.field,
            reason: err.to_string(),
        }
    }
}
