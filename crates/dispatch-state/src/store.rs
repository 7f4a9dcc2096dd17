//! Binding persistence.
//!
//! [`BindingStore`] is the storage interface the dispatch engine depends on.
//! [`RedbBindingStore`] implements it over a single redb file (or an
//! in-memory backend for tests). Each write runs in its own write
//! transaction: either the whole transaction commits durably or nothing
//! is persisted.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::BINDINGS;
use crate::types::{Binding, validate_pair};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Durable device→node mapping with transactional writes.
///
/// Implementations must be last-write-wins per device id and must not
/// expose a partially applied `put_many`.
pub trait BindingStore: Send + Sync + 'static {
    /// Record `node` as the current binding for `device_id`.
    fn put(&self, device_id: &str, node: &str) -> StateResult<()>;

    /// Record several bindings in one transaction. All or nothing.
    fn put_many(&self, bindings: &[Binding]) -> StateResult<usize>;

    /// Current binding for a device, if any.
    fn get(&self, device_id: &str) -> StateResult<Option<String>>;

    /// Every stored binding, in key order.
    fn list(&self) -> StateResult<Vec<Binding>>;

    /// Number of stored bindings.
    fn count(&self) -> StateResult<u64>;
}

/// Thread-safe binding store backed by redb.
#[derive(Clone)]
pub struct RedbBindingStore {
    db: Arc<Database>,
}

impl RedbBindingStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// The parent directory is created if it does not exist yet.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "binding store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory binding store opened");
        Ok(store)
    }

    /// Create the binding table if it doesn't exist yet.
    fn ensure_table(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `write` in one write transaction: commit on `Ok`, abort on `Err`.
    fn write_txn<T>(
        &self,
        write: impl FnOnce(&mut Table<'_, &'static str, &'static [u8]>) -> StateResult<T>,
    ) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let written = {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            write(&mut table)
        };
        match written {
            Ok(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                warn!(error = %e, "binding write rolled back");
                Err(e)
            }
        }
    }
}

impl BindingStore for RedbBindingStore {
    fn put(&self, device_id: &str, node: &str) -> StateResult<()> {
        self.write_txn(|table| write_pair(table, device_id, node))?;
        debug!(%device_id, %node, "binding stored");
        Ok(())
    }

    fn put_many(&self, bindings: &[Binding]) -> StateResult<usize> {
        let count = self.write_txn(|table| {
            for binding in bindings {
                write_pair(table, &binding.device_id, &binding.node)?;
            }
            Ok(bindings.len())
        })?;
        debug!(count, "binding batch stored");
        Ok(count)
    }

    fn get(&self, device_id: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        match table.get(device_id).map_err(map_err!(Read))? {
            Some(guard) => decode(device_id, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    fn list(&self) -> StateResult<Vec<Binding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let device_id = key.value();
            let node = decode(device_id, value.value())?;
            results.push(Binding::new(device_id, node));
        }
        Ok(results)
    }

    fn count(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }
}

fn write_pair(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    device_id: &str,
    node: &str,
) -> StateResult<()> {
    validate_pair(device_id, node)?;
    table
        .insert(device_id, node.as_bytes())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn decode(device_id: &str, bytes: &[u8]) -> StateResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| StateError::Decode(device_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> RedbBindingStore {
        RedbBindingStore::open_in_memory().unwrap()
    }

    #[test]
    fn put_and_get() {
        let store = test_store();
        store.put("dev-1", "edge-a").unwrap();

        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-a"));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = test_store();
        assert!(store.get("nobody").unwrap().is_none());
    }

    #[test]
    fn last_write_wins() {
        let store = test_store();
        store.put("dev-1", "edge-a").unwrap();
        store.put("dev-1", "edge-b").unwrap();

        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-b"));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn put_rejects_empty_device_id() {
        let store = test_store();
        let err = store.put("", "edge-a").unwrap_err();

        assert!(matches!(err, StateError::InvalidBinding(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn put_rejects_empty_node_name() {
        let store = test_store();
        assert!(store.put("dev-1", "").is_err());
        assert!(store.get("dev-1").unwrap().is_none());
    }

    #[test]
    fn failed_put_keeps_previous_binding() {
        let store = test_store();
        store.put("dev-1", "edge-a").unwrap();

        let err = store.put("dev-1", "").unwrap_err();

        assert!(matches!(err, StateError::InvalidBinding(_)));
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-a"));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn failed_put_keeps_previous_binding_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.redb");
        {
            let store = RedbBindingStore::open(&path).unwrap();
            store.put("dev-1", "edge-a").unwrap();
            assert!(store.put("dev-1", "").is_err());
        }

        let store = RedbBindingStore::open(&path).unwrap();
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-a"));
    }

    #[test]
    fn list_returns_all_in_key_order() {
        let store = test_store();
        store.put("dev-b", "edge-2").unwrap();
        store.put("dev-a", "edge-1").unwrap();

        let all = store.list().unwrap();
        assert_eq!(
            all,
            vec![Binding::new("dev-a", "edge-1"), Binding::new("dev-b", "edge-2")]
        );
    }

    #[test]
    fn put_many_commits_together() {
        let store = test_store();
        let written = store
            .put_many(&[
                Binding::new("dev-1", "edge-a"),
                Binding::new("dev-2", "edge-b"),
            ])
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.get("dev-2").unwrap().as_deref(), Some("edge-b"));
    }

    #[test]
    fn failed_batch_rolls_back_everything() {
        let store = test_store();
        store.put("dev-1", "edge-a").unwrap();

        // The second entry fails validation after the first was inserted.
        let result = store.put_many(&[
            Binding::new("dev-1", "edge-b"),
            Binding::new("", "edge-c"),
            Binding::new("dev-3", "edge-d"),
        ]);

        assert!(result.is_err());
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-a"));
        assert!(store.get("dev-3").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn store_usable_after_rollback() {
        let store = test_store();
        assert!(store.put_many(&[Binding::new("dev-1", "")]).is_err());

        store.put("dev-1", "edge-a").unwrap();
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-a"));
    }

    #[test]
    fn empty_store_operations() {
        let store = test_store();

        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.put_many(&[]).unwrap(), 0);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("dispatch.redb");

        {
            let store = RedbBindingStore::open(&db_path).unwrap();
            store.put("dev-1", "edge-a").unwrap();
            store.put("dev-2", "edge-b").unwrap();
            store.put("dev-1", "edge-c").unwrap();
        }

        // Reopen the same database file.
        let store = RedbBindingStore::open(&db_path).unwrap();
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-c"));
        assert_eq!(store.get("dev-2").unwrap().as_deref(), Some("edge-b"));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn open_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("state").join("dispatch.redb");

        let store = RedbBindingStore::open(&db_path).unwrap();
        store.put("dev-1", "edge-a").unwrap();

        assert!(db_path.exists());
    }

    #[test]
    fn shared_clones_see_same_data() {
        let store = test_store();
        let other = store.clone();

        store.put("dev-1", "edge-a").unwrap();
        assert_eq!(other.get("dev-1").unwrap().as_deref(), Some("edge-a"));
    }

    #[test]
    fn usable_as_trait_object() {
        let store: Arc<dyn BindingStore> = Arc::new(test_store());
        store.put("dev-1", "edge-a").unwrap();
        assert_eq!(store.get("dev-1").unwrap().as_deref(), Some("edge-a"));
    }
}
