//! Administrative commands. Each prints the affected record as pretty JSON.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;
use vmscale_core::{epoch_secs, VmscaleConfig};
use vmscale_engine::{EngineSettings, ScalingDriver, ScalingEngine};
use vmscale_policy::*;
use vmscale_state::{CounterId, GroupId, GroupState, MetricSample, Repository, StateStore};

use crate::backends::{LocalCapacityManager, StoreMetricProvider};

/// The local operator: a root admin acting as account 1 in domain 1.
pub fn local_admin() -> CallContext {
    CallContext {
        user_id: 1,
        account_id: 1,
        domain_id: 1,
        account_type: AccountType::RootAdmin,
    }
}

/// Open the store at the configured location, creating its directory.
pub fn open_store(config: &VmscaleConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.store.data_dir).with_context(|| {
        format!("creating data directory {}", config.store.data_dir.display())
    })?;
    let path = config.db_path();
    let store = StateStore::open(&path)
        .with_context(|| format!("opening state store {}", path.display()))?;
    info!(path = ?path, "state store opened");
    Ok(store)
}

pub fn manager(store: &StateStore, config: &VmscaleConfig) -> AutoScaleManager {
    let repo: Arc<dyn Repository> = Arc::new(store.clone());
    AutoScaleManager::new(repo, &config.engine)
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn create_counter(manager: &AutoScaleManager, cmd: CreateCounter) -> anyhow::Result<()> {
    let counter = manager.create_counter(&local_admin(), &cmd)?;
    print_json(&counter)
}

pub fn create_condition(manager: &AutoScaleManager, cmd: CreateCondition) -> anyhow::Result<()> {
    let condition = manager.create_condition(&local_admin(), &cmd)?;
    print_json(&condition)
}

pub fn create_policy(manager: &AutoScaleManager, cmd: CreateAutoScalePolicy) -> anyhow::Result<()> {
    let policy = manager.create_autoscale_policy(&local_admin(), &cmd)?;
    print_json(&policy)
}

pub fn create_group(manager: &AutoScaleManager, cmd: CreateVmGroup) -> anyhow::Result<()> {
    let group = manager.create_vm_group(&local_admin(), &cmd)?;
    print_json(&group)
}

pub fn list_groups(manager: &AutoScaleManager) -> anyhow::Result<()> {
    let groups = manager.list_vm_groups(&local_admin())?;
    print_json(&groups)
}

pub fn set_group_state(
    manager: &AutoScaleManager,
    id: GroupId,
    state: GroupState,
) -> anyhow::Result<()> {
    let group = manager.set_vm_group_state(&local_admin(), id, state)?;
    print_json(&group)
}

pub fn delete_group(manager: &AutoScaleManager, id: GroupId) -> anyhow::Result<()> {
    manager.delete_vm_group(&local_admin(), id)?;
    print_json(&serde_json::json!({ "deleted": id }))
}

/// Record a metric sample for `(group, counter)`, replacing the previous one.
pub fn record_metric(
    store: &StateStore,
    group_id: GroupId,
    counter_id: CounterId,
    value: f64,
) -> anyhow::Result<()> {
    if store.find_vm_group(group_id)?.is_none() {
        anyhow::bail!("vm group {group_id} not found");
    }
    if store.find_counter(counter_id)?.is_none() {
        anyhow::bail!("counter {counter_id} not found");
    }
    if !value.is_finite() {
        anyhow::bail!("metric value must be a finite number, got {value}");
    }
    let sample = MetricSample {
        group_id,
        counter_id,
        value,
        recorded_at: epoch_secs(),
    };
    store.put_metric_sample(&sample)?;
    print_json(&sample)
}

/// Run the scaling driver until Ctrl-C.
pub async fn run(store: StateStore, config: &VmscaleConfig) -> anyhow::Result<()> {
    let settings = EngineSettings::from_config(&config.engine)?;
    let discovery_interval = config.engine.discovery_interval()?;

    let engine = ScalingEngine::new(
        Arc::new(store.clone()),
        Arc::new(StoreMetricProvider::new(store)),
        Arc::new(LocalCapacityManager::new()),
        settings,
    );
    let driver = Arc::new(ScalingDriver::new(engine));
    info!(
        fetch_timeout = ?settings.fetch_timeout,
        action_timeout = ?settings.action_timeout,
        "scaling engine initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver_handle = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.run(discovery_interval, shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    driver_handle.await?;
    info!("vmscaled stopped");
    Ok(())
}
