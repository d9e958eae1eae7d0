//! Driver: one interval task per monitored group.
//!
//! Groups tick independently on their own interval. Stopping a group sends
//! its shutdown signal; a tick already running completes, and no further
//! tick starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vmscale_core::epoch_secs;
use vmscale_state::{GroupId, GroupState};

use crate::error::{EngineError, EngineResult};
use crate::scaler::{GroupScaler, ScalingEngine};

/// Per-group task state.
struct GroupSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns the per-group tick tasks.
pub struct ScalingDriver {
    engine: ScalingEngine,
    /// Active tasks: group_id → slot.
    groups: Arc<RwLock<HashMap<GroupId, GroupSlot>>>,
}

impl ScalingDriver {
    pub fn new(engine: ScalingEngine) -> Self {
        Self {
            engine,
            groups: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start ticking `group_id`. A running task for the group is stopped,
    /// and its in-flight tick completes, before the replacement starts.
    pub async fn start_group(&self, group_id: GroupId) -> EngineResult<()> {
        let mut scaler = self.engine.scaler(group_id);
        scaler.prime()?;

        let mut groups = self.groups.write().await;
        if let Some(old) = groups.remove(&group_id) {
            stop_slot(group_id, old).await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_group_loop(&mut scaler, shutdown_rx).await;
        });
        groups.insert(
            group_id,
            GroupSlot {
                handle,
                shutdown_tx,
            },
        );

        info!(group = group_id, "group monitoring started");
        Ok(())
    }

    /// Stop ticking `group_id`, waiting for an in-flight tick to finish.
    pub async fn stop_group(&self, group_id: GroupId) {
        let slot = self.groups.write().await.remove(&group_id);
        if let Some(slot) = slot {
            stop_slot(group_id, slot).await;
            info!(group = group_id, "group monitoring stopped");
        }
    }

    /// Stop every group task (for graceful shutdown).
    pub async fn stop_all(&self) {
        let slots: Vec<_> = self.groups.write().await.drain().collect();
        for (group_id, slot) in slots {
            stop_slot(group_id, slot).await;
        }
        info!("all group monitors stopped");
    }

    /// Groups with a live task, in id order.
    pub async fn active_groups(&self) -> Vec<GroupId> {
        let groups = self.groups.read().await;
        let mut ids: Vec<GroupId> = groups
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_monitoring(&self, group_id: GroupId) -> bool {
        let groups = self.groups.read().await;
        groups
            .get(&group_id)
            .is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Reconcile running tasks with the store: start enabled groups without
    /// a live task, stop tasks of disabled or deleted groups.
    pub async fn sync(&self) -> EngineResult<()> {
        let groups = self.engine.repository().list_vm_groups()?;
        let enabled: Vec<GroupId> = groups
            .iter()
            .filter(|g| g.state == GroupState::Enabled)
            .map(|g| g.id)
            .collect();

        let running: Vec<GroupId> = self.groups.read().await.keys().copied().collect();
        for group_id in running {
            if !enabled.contains(&group_id) {
                self.stop_group(group_id).await;
            }
        }

        for group_id in enabled {
            if self.is_monitoring(group_id).await {
                continue;
            }
            match self.start_group(group_id).await {
                Ok(()) => {}
                Err(EngineError::GroupNotFound(_) | EngineError::GroupDisabled(_)) => {
                    debug!(group = group_id, "group changed during sync, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Rediscover groups every `discovery_interval` until `shutdown` fires,
    /// then stop all group tasks.
    pub async fn run(&self, discovery_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            discovery_interval_secs = discovery_interval.as_secs(),
            "scaling driver started"
        );

        if let Err(e) = self.sync().await {
            error!(error = %e, "group discovery failed");
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(discovery_interval) => {
                    if let Err(e) = self.sync().await {
                        error!(error = %e, "group discovery failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaling driver shutting down");
                    break;
                }
            }
        }

        self.stop_all().await;
    }
}

async fn stop_slot(group_id: GroupId, slot: GroupSlot) {
    let _ = slot.shutdown_tx.send(true);
    if let Err(e) = slot.handle.await {
        warn!(group = group_id, error = %e, "group task ended abnormally");
    }
}

/// The tick loop for a single group.
async fn run_group_loop(scaler: &mut GroupScaler, mut shutdown: watch::Receiver<bool>) {
    let group_id = scaler.group_id();
    debug!(group = group_id, "group loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }
        let interval = scaler.interval().unwrap_or(Duration::from_secs(30));

        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match scaler.tick(epoch_secs()).await {
                    Ok(report) => {
                        if let Some(fired) = report.fired() {
                            debug!(group = group_id, policy = fired.policy_id, outcome = ?fired.outcome, "tick fired");
                        }
                    }
                    Err(EngineError::GroupNotFound(_)) => {
                        info!(group = group_id, "group deleted, loop ending");
                        break;
                    }
                    Err(EngineError::GroupDisabled(_)) => {
                        info!(group = group_id, "group disabled, loop ending");
                        break;
                    }
                    Err(e) => {
                        error!(group = group_id, error = %e, "tick failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }

    debug!(group = group_id, "group loop shutting down");
}
