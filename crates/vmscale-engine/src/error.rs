//! Engine error types.

use std::time::Duration;

use thiserror::Error;
use vmscale_state::{GroupId, StateError};

/// Errors that end a tick for one group.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("vm group {0} not found")]
    GroupNotFound(GroupId),

    #[error("vm group {0} is disabled")]
    GroupDisabled(GroupId),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A collaborator call that did not produce a value within the tick.
///
/// Recovered locally: a failed fetch makes the policies that depend on it
/// non-breaching for the tick, a failed dispatch leaves membership unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(String),
}

/// Await `fut` for at most `limit`, folding both failure modes into [`CallError`].
pub(crate) async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, CallError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallError::Failed(format!("{e:#}"))),
        Err(_) => Err(CallError::TimedOut(limit)),
    }
}
