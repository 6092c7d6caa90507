//! StateStore — redb-backed persistence for connector rollouts.
//!
//! Provides typed CRUD operations over rollout records. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).
//!
//! Rollouts are never deleted: terminal records stay in the table as the
//! archive of past rollouts.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::ROLLOUTS;
use crate::types::{ActorDefinitionId, ConnectorRollout, RolloutId};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

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
        txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a new rollout, enforcing the one-active-rollout-per-actor
    /// invariant. Fails with `Conflict` if a non-terminal rollout already
    /// exists for the same actor definition.
    pub fn insert_rollout(&self, rollout: &ConnectorRollout) -> StateResult<()> {
        if let Some(existing) = self.active_rollout_for_actor(&rollout.actor_definition_id)? {
            return Err(StateError::Conflict(format!(
                "active rollout {} already exists for actor {}",
                existing.id, rollout.actor_definition_id
            )));
        }
        self.put_rollout(rollout)
    }

    /// Insert or update a rollout record unconditionally.
    pub fn put_rollout(&self, rollout: &ConnectorRollout) -> StateResult<()> {
        let key = rollout.table_key();
        let value = serde_json::to_vec(rollout).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, state = ?rollout.state, "rollout stored");
        Ok(())
    }

    /// Get a rollout by id.
    pub fn get_rollout(&self, id: &RolloutId) -> StateResult<Option<ConnectorRollout>> {
        let key = id.to_string();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let rollout: ConnectorRollout =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(rollout))
            }
            None => Ok(None),
        }
    }

    /// List all rollouts, terminal ones included.
    pub fn list_rollouts(&self) -> StateResult<Vec<ConnectorRollout>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let rollout: ConnectorRollout =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(rollout);
        }
        Ok(results)
    }

    /// List rollouts that have not reached a terminal state.
    pub fn list_active_rollouts(&self) -> StateResult<Vec<ConnectorRollout>> {
        Ok(self
            .list_rollouts()?
            .into_iter()
            .filter(|r| !r.is_terminal())
            .collect())
    }

    /// Find the active (non-terminal) rollout for an actor definition, if any.
    pub fn active_rollout_for_actor(
        &self,
        actor_definition_id: &ActorDefinitionId,
    ) -> StateResult<Option<ConnectorRollout>> {
        Ok(self
            .list_active_rollouts()?
            .into_iter()
            .find(|r| r.actor_definition_id == *actor_definition_id))
    }
}
