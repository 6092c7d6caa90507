//! redb table definitions for the SyncGrid state store.
//!
//! Tables use `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Connector rollout records keyed by `{rollout_id}` (UUID string).
pub const ROLLOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollouts");
