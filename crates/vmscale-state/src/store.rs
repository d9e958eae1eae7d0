//! StateStore: redb-backed implementation of the persistence port.
//!
//! Provides typed create/find operations over counters, conditions,
//! policies and VM groups, plus latest-value metric samples. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::repository::Repository;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type EntityTable = TableDefinition<'static, u64, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.open_table(CONDITIONS).map_err(map_err!(Table))?;
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(POLICY_CONDITIONS).map_err(map_err!(Table))?;
        txn.open_table(VM_GROUPS).map_err(map_err!(Table))?;
        txn.open_table(METRIC_SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic entity rows ────────────────────────────────────────

    fn insert_entity<T: Serialize>(
        &self,
        def: EntityTable,
        sequence: &'static str,
        mut entity: T,
        set_id: impl FnOnce(&mut T, u64),
    ) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id = next_id(&txn, sequence)?;
        set_id(&mut entity, id);
        let value = serde_json::to_vec(&entity).map_err(map_err!(Serialize))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table.insert(id, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(table = sequence, id, "row inserted");
        Ok(entity)
    }

    fn replace_entity<T: Serialize>(
        &self,
        def: EntityTable,
        name: &'static str,
        id: u64,
        entity: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(entity).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let exists = table.get(id).map_err(map_err!(Read))?.is_some();
            if !exists {
                return Err(StateError::NotFound { table: name, id });
            }
            table.insert(id, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_entity<T: DeserializeOwned>(&self, def: EntityTable, id: u64) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let entity: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    fn list_entities<T: DeserializeOwned>(&self, def: EntityTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entity: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(entity);
        }
        Ok(results)
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Insert or replace the latest sample for a (group, counter) pair.
    pub fn put_metric_sample(&self, sample: &MetricSample) -> StateResult<()> {
        let key = sample.table_key();
        let value = serde_json::to_vec(sample).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METRIC_SAMPLES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Latest sample for a counter within a group.
    pub fn latest_metric_sample(
        &self,
        group_id: GroupId,
        counter_id: CounterId,
    ) -> StateResult<Option<MetricSample>> {
        let key = sample_key(group_id, counter_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METRIC_SAMPLES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let sample: MetricSample =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(sample))
            }
            None => Ok(None),
        }
    }
}

/// Draw the next id from a sequence inside an open write transaction.
fn next_id(txn: &WriteTransaction, sequence: &'static str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let current = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current
        .checked_add(1)
        .ok_or(StateError::SequenceExhausted(sequence))?;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}

impl Repository for StateStore {
    fn persist_counter(&self, counter: Counter) -> StateResult<Counter> {
        self.insert_entity(COUNTERS, "counters", counter, |c, id| c.id = id)
    }

    fn find_counter(&self, id: CounterId) -> StateResult<Option<Counter>> {
        self.get_entity(COUNTERS, id)
    }

    fn list_counters(&self) -> StateResult<Vec<Counter>> {
        self.list_entities(COUNTERS)
    }

    fn persist_condition(&self, condition: Condition) -> StateResult<Condition> {
        self.insert_entity(CONDITIONS, "conditions", condition, |c, id| c.id = id)
    }

    fn find_condition(&self, id: ConditionId) -> StateResult<Option<Condition>> {
        self.get_entity(CONDITIONS, id)
    }

    fn persist_policy(&self, mut policy: AutoScalePolicy) -> StateResult<AutoScalePolicy> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        policy.id = next_id(&txn, "policies")?;
        let value = serde_json::to_vec(&policy).map_err(map_err!(Serialize))?;
        {
            let mut policies = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            policies
                .insert(policy.id, value.as_slice())
                .map_err(map_err!(Write))?;

            let mut maps = txn.open_table(POLICY_CONDITIONS).map_err(map_err!(Table))?;
            let mut mapped = HashSet::with_capacity(policy.condition_ids.len());
            for (position, condition_id) in policy.condition_ids.iter().enumerate() {
                let row = PolicyConditionMap {
                    policy_id: policy.id,
                    condition_id: *condition_id,
                    position: position as u32,
                };
                if !mapped.insert(*condition_id) {
                    return Err(StateError::DuplicateMapRow {
                        policy_id: policy.id,
                        condition_id: *condition_id,
                    });
                }
                let row_value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
                maps.insert(row.table_key().as_str(), row_value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        // Dropping an uncommitted transaction on any error above aborts it,
        // so the policy row never lands without its map rows.
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            policy = policy.id,
            conditions = policy.condition_ids.len(),
            "policy stored"
        );
        Ok(policy)
    }

    fn find_policy(&self, id: PolicyId) -> StateResult<Option<AutoScalePolicy>> {
        self.get_entity(POLICIES, id)
    }

    fn list_policy_conditions(&self, policy_id: PolicyId) -> StateResult<Vec<PolicyConditionMap>> {
        let prefix = format!("{policy_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICY_CONDITIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let row: PolicyConditionMap =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(row);
            }
        }
        Ok(results)
    }

    fn set_policy_last_quiet_time(&self, id: PolicyId, at: u64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            let mut policy: AutoScalePolicy = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound { table: "policies", id }),
            };
            policy.last_quiet_time = Some(at);
            let value = serde_json::to_vec(&policy).map_err(map_err!(Serialize))?;
            table.insert(id, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(policy = id, at, "policy quiet time recorded");
        Ok(())
    }

    fn persist_vm_group(&self, group: AutoScaleVmGroup) -> StateResult<AutoScaleVmGroup> {
        self.insert_entity(VM_GROUPS, "vm_groups", group, |g, id| g.id = id)
    }

    fn update_vm_group(&self, group: &AutoScaleVmGroup) -> StateResult<()> {
        self.replace_entity(VM_GROUPS, "vm_groups", group.id, group)
    }

    fn find_vm_group(&self, id: GroupId) -> StateResult<Option<AutoScaleVmGroup>> {
        self.get_entity(VM_GROUPS, id)
    }

    fn list_vm_groups(&self) -> StateResult<Vec<AutoScaleVmGroup>> {
        self.list_entities(VM_GROUPS)
    }

    fn delete_vm_group(&self, id: GroupId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(VM_GROUPS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group = id, existed, "vm group deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Owner = Owner {
        account_id: 2,
        domain_id: 1,
    };

    fn test_counter(name: &str) -> Counter {
        Counter {
            id: 0,
            name: name.to_string(),
            provider: Provider::VirtualRouter,
            source: Source::Cpu,
            value: "cpu.load".to_string(),
            created_at: 1000,
        }
    }

    fn test_condition(counter_id: CounterId) -> Condition {
        Condition {
            id: 0,
            counter_id,
            operator: Operator::Gt,
            threshold: 80.0,
            owner: OWNER,
            created_at: 1000,
        }
    }

    fn test_policy(condition_ids: Vec<ConditionId>) -> AutoScalePolicy {
        AutoScalePolicy {
            id: 0,
            action: Action::ScaleUp,
            duration_secs: 300,
            quiet_time_secs: 300,
            last_quiet_time: None,
            condition_ids,
            owner: OWNER,
            created_at: 1000,
        }
    }

    fn test_group() -> AutoScaleVmGroup {
        AutoScaleVmGroup {
            id: 0,
            load_balancer_id: 21,
            min_members: 2,
            max_members: 3,
            member_port: 8080,
            interval_secs: 30,
            destroy_vm_grace_period_secs: 33,
            scale_up_policy_ids: vec![1],
            scale_down_policy_ids: Vec::new(),
            members: Vec::new(),
            state: GroupState::Enabled,
            owner: OWNER,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    // ── Counters / conditions ──────────────────────────────────────

    #[test]
    fn counter_persist_assigns_sequential_ids() {
        let store = StateStore::open_in_memory().unwrap();

        let a = store.persist_counter(test_counter("cpu")).unwrap();
        let b = store.persist_counter(test_counter("memory")).unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.find_counter(1).unwrap(), Some(a));
        assert_eq!(store.list_counters().unwrap().len(), 2);
    }

    #[test]
    fn find_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.find_counter(42).unwrap().is_none());
        assert!(store.find_condition(42).unwrap().is_none());
        assert!(store.find_policy(42).unwrap().is_none());
        assert!(store.find_vm_group(42).unwrap().is_none());
    }

    #[test]
    fn sequences_are_per_table() {
        let store = StateStore::open_in_memory().unwrap();
        let counter = store.persist_counter(test_counter("cpu")).unwrap();
        let condition = store.persist_condition(test_condition(counter.id)).unwrap();

        assert_eq!(counter.id, 1);
        assert_eq!(condition.id, 1);
        assert_eq!(store.find_condition(1).unwrap().unwrap().counter_id, 1);
    }

    // ── Policies ───────────────────────────────────────────────────

    #[test]
    fn policy_persist_writes_one_map_row_per_condition() {
        let store = StateStore::open_in_memory().unwrap();
        let policy = store.persist_policy(test_policy(vec![5, 3, 9])).unwrap();

        let rows = store.list_policy_conditions(policy.id).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.condition_id).collect();
        assert_eq!(ids, vec![5, 3, 9]);
        assert!(rows.iter().all(|r| r.policy_id == policy.id));
    }

    #[test]
    fn policy_map_rows_do_not_leak_across_policies() {
        let store = StateStore::open_in_memory().unwrap();
        for _ in 0..11 {
            store.persist_policy(test_policy(vec![1])).unwrap();
        }
        // Policy 1 must not pick up rows of policy 11.
        assert_eq!(store.list_policy_conditions(1).unwrap().len(), 1);
        assert_eq!(store.list_policy_conditions(11).unwrap().len(), 1);
        assert!(store.list_policy_conditions(12).unwrap().is_empty());
    }

    #[test]
    fn policy_rolled_back_when_map_insert_fails() {
        let store = StateStore::open_in_memory().unwrap();

        // The second map row is rejected after the policy row and the
        // first map row are already written.
        let err = store.persist_policy(test_policy(vec![4, 4])).unwrap_err();
        assert!(matches!(
            err,
            StateError::DuplicateMapRow {
                policy_id: 1,
                condition_id: 4
            }
        ));
        assert!(store.find_policy(1).unwrap().is_none());
        assert!(store.list_policy_conditions(1).unwrap().is_empty());

        // The id sequence rolled back with the rest of the transaction.
        let stored = store.persist_policy(test_policy(vec![4])).unwrap();
        assert_eq!(stored.id, 1);
        assert_eq!(store.list_policy_conditions(1).unwrap().len(), 1);
    }

    #[test]
    fn last_quiet_time_update() {
        let store = StateStore::open_in_memory().unwrap();
        let policy = store.persist_policy(test_policy(vec![1])).unwrap();
        assert_eq!(policy.last_quiet_time, None);

        store.set_policy_last_quiet_time(policy.id, 4242).unwrap();
        let reloaded = store.find_policy(policy.id).unwrap().unwrap();
        assert_eq!(reloaded.last_quiet_time, Some(4242));
        assert_eq!(reloaded.condition_ids, vec![1]);
    }

    #[test]
    fn last_quiet_time_on_missing_policy_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.set_policy_last_quiet_time(7, 1).unwrap_err();
        assert!(matches!(err, StateError::NotFound { table: "policies", id: 7 }));
    }

    // ── VM groups ──────────────────────────────────────────────────

    #[test]
    fn group_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut group = store.persist_vm_group(test_group()).unwrap();

        group.members.push(VmMember {
            vm_id: "vm-1".to_string(),
            joined_at: 2000,
        });
        group.updated_at = 2000;
        store.update_vm_group(&group).unwrap();

        let reloaded = store.find_vm_group(group.id).unwrap().unwrap();
        assert_eq!(reloaded.member_count(), 1);
        assert_eq!(reloaded.updated_at, 2000);
    }

    #[test]
    fn group_update_unknown_id_fails() {
        let store = StateStore::open_in_memory().unwrap();
        let mut group = test_group();
        group.id = 99;
        let err = store.update_vm_group(&group).unwrap_err();
        assert!(matches!(err, StateError::NotFound { table: "vm_groups", id: 99 }));
        assert!(store.list_vm_groups().unwrap().is_empty());
    }

    #[test]
    fn group_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let group = store.persist_vm_group(test_group()).unwrap();

        assert!(store.delete_vm_group(group.id).unwrap());
        assert!(!store.delete_vm_group(group.id).unwrap());
        assert!(store.find_vm_group(group.id).unwrap().is_none());
    }

    // ── Metric samples ─────────────────────────────────────────────

    #[test]
    fn metric_sample_keeps_latest_value() {
        let store = StateStore::open_in_memory().unwrap();

        for (value, at) in [(10.0, 1000u64), (55.5, 1030)] {
            store
                .put_metric_sample(&MetricSample {
                    group_id: 1,
                    counter_id: 4,
                    value,
                    recorded_at: at,
                })
                .unwrap();
        }

        let latest = store.latest_metric_sample(1, 4).unwrap().unwrap();
        assert_eq!(latest.value, 55.5);
        assert_eq!(latest.recorded_at, 1030);
        assert!(store.latest_metric_sample(1, 5).unwrap().is_none());
        assert!(store.latest_metric_sample(2, 4).unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.persist_counter(test_counter("cpu")).unwrap();
        }

        // Reopen the same database file; the sequence continues.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.find_counter(1).unwrap().unwrap().name, "cpu");
        let next = store.persist_counter(test_counter("memory")).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_counters().unwrap().is_empty());
        assert!(store.list_vm_groups().unwrap().is_empty());
        assert!(store.list_policy_conditions(1).unwrap().is_empty());
        assert!(!store.delete_vm_group(1).unwrap());
    }
}
