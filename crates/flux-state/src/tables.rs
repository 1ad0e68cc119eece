//! redb table definitions for the catalog.
//!
//! Row tables use zero-padded decimal id keys (`{:020}`) and
//! JSON-serialized values; `META` holds the per-table monotonic id
//! counters.

use redb::TableDefinition;

/// App rows keyed by app id.
pub const APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("apps");

/// Deployment rows keyed by deployment id.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Container rows keyed by container id.
pub const CONTAINERS: TableDefinition<&str, &[u8]> = TableDefinition::new("containers");

/// Volume rows keyed by volume id.
pub const VOLUMES: TableDefinition<&str, &[u8]> = TableDefinition::new("volumes");

/// Monotonic id counters keyed by table name.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Encode an id as a fixed-width table key so iteration order matches
/// insertion order.
pub fn id_key(id: u64) -> String {
    format!("{id:020}")
}
