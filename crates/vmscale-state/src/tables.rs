//! redb table definitions for the vmscale entity store.
//!
//! Entity tables use `u64` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{parent_id}:{child}`.

use redb::TableDefinition;

/// Counters keyed by id.
pub const COUNTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("counters");

/// Conditions keyed by id.
pub const CONDITIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("conditions");

/// Autoscale policies keyed by id.
pub const POLICIES: TableDefinition<u64, &[u8]> = TableDefinition::new("policies");

/// Policy → condition rows keyed by `{policy_id}:{position:06}`.
pub const POLICY_CONDITIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("policy_conditions");

/// VM groups keyed by id.
pub const VM_GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("vm_groups");

/// Latest metric sample keyed by `{group_id}:{counter_id}`.
pub const METRIC_SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("metric_samples");

/// Id sequences keyed by entity table name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
