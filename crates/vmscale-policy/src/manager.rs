//! AutoScaleManager: entry point for the create operations.
//!
//! The operations themselves live next to the entity they build
//! (`counter.rs`, `condition.rs`, `policy.rs`, `group.rs`).

use std::sync::Arc;

use vmscale_core::EngineConfig;
use vmscale_state::Repository;

use crate::context::{DefaultOwnerResolver, OwnerResolver};

pub struct AutoScaleManager {
    pub(crate) repo: Arc<dyn Repository>,
    pub(crate) owners: Arc<dyn OwnerResolver>,
    /// Smallest accepted policy duration, in seconds.
    pub(crate) min_duration_secs: u64,
    pub(crate) default_quiet_time_secs: u64,
}

impl AutoScaleManager {
    pub fn new(repo: Arc<dyn Repository>, config: &EngineConfig) -> Self {
        Self {
            repo,
            owners: Arc::new(DefaultOwnerResolver),
            min_duration_secs: config.min_duration_secs,
            default_quiet_time_secs: config.default_quiet_time_secs,
        }
    }

    /// Replace the owner resolver.
    pub fn with_owner_resolver(mut self, owners: Arc<dyn OwnerResolver>) -> Self {
        self.owners = owners;
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }
}
