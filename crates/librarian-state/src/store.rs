//! StateStore — redb-backed metadata persistence for the Librarian.
//!
//! Provides typed CRUD operations over observations, files, instances,
//! stores, clone transfers, file events, and standing orders. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe metadata store backed by redb.
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
        for table in [
            OBSERVATIONS,
            FILES,
            STORES,
            INSTANCES,
            CLONE_TRANSFERS,
            FILE_EVENTS,
            STANDING_ORDERS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ───────────────────────────────────────────

    fn get_record<T: DeserializeOwned>(&self, table: RecordTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List records whose key starts with `prefix` (all records for `""`),
    /// in key order.
    fn scan_records<T: DeserializeOwned>(&self, table: RecordTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    fn put_record<T: Serialize>(&self, table: RecordTable, key: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn remove_record(&self, table: RecordTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// Insert a record whose id is drawn from `sequence`, failing if `key_of`
    /// yields a key that is already taken. Id allocation and insert share one
    /// transaction.
    fn insert_sequenced<T: Serialize>(
        &self,
        table: RecordTable,
        sequence: &str,
        mut record: T,
        set_id: impl FnOnce(&mut T, u64),
        key_of: impl FnOnce(&T) -> String,
    ) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id = next_id(&txn, sequence)?;
        set_id(&mut record, id);
        let key = key_of(&record);
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(record)
    }

    // ── Stores ────────────────────────────────────────────────────

    /// Insert a store if no store with that name exists yet; return the
    /// persisted record either way.
    pub fn ensure_store(&self, store: StoreRecord) -> StateResult<StoreRecord> {
        if let Some(existing) = self.get_store_by_name(&store.name)? {
            return Ok(existing);
        }
        let record = self.insert_sequenced(
            STORES,
            "stores",
            store,
            |s, id| s.id = id,
            |s| s.name.clone(),
        )?;
        debug!(store = %record.name, id = record.id, "store registered");
        Ok(record)
    }

    pub fn get_store_by_name(&self, name: &str) -> StateResult<Option<StoreRecord>> {
        self.get_record(STORES, name)
    }

    pub fn get_store(&self, id: StoreId) -> StateResult<Option<StoreRecord>> {
        Ok(self
            .list_stores()?
            .into_iter()
            .find(|store| store.id == id))
    }

    pub fn list_stores(&self) -> StateResult<Vec<StoreRecord>> {
        self.scan_records(STORES, "")
    }

    /// Update an existing store's record (e.g. its availability).
    pub fn put_store(&self, store: &StoreRecord) -> StateResult<()> {
        if self.get_store_by_name(&store.name)?.is_none() {
            return Err(StateError::NotFound(store.name.clone()));
        }
        self.put_record(STORES, &store.name, store)
    }

    // ── Observations ──────────────────────────────────────────────

    /// Insert or update an observation.
    ///
    /// Observations and files are written by the ingest side (uploaders and
    /// the admin surface); the replication engine only reads them.
    pub fn put_observation(&self, obs: &Observation) -> StateResult<()> {
        self.put_record(OBSERVATIONS, &obs.table_key(), obs)
    }

    pub fn list_observations(&self) -> StateResult<Vec<Observation>> {
        self.scan_records(OBSERVATIONS, "")
    }

    // ── Files ─────────────────────────────────────────────────────

    /// Register a new file. Files are immutable, so an existing name is a
    /// conflict.
    pub fn insert_file(&self, file: &FileRecord) -> StateResult<()> {
        if self.get_file(&file.name)?.is_some() {
            return Err(StateError::Conflict(file.name.clone()));
        }
        self.put_record(FILES, &file.name, file)?;
        debug!(file = %file.name, size = file.size, "file registered");
        Ok(())
    }

    pub fn get_file(&self, name: &str) -> StateResult<Option<FileRecord>> {
        self.get_record(FILES, name)
    }

    pub fn list_files(&self) -> StateResult<Vec<FileRecord>> {
        self.scan_records(FILES, "")
    }

    // ── Instances ─────────────────────────────────────────────────

    /// Insert a new instance, assigning its id. A second instance of the
    /// same file on the same store is a conflict.
    pub fn insert_instance(&self, instance: FileInstance) -> StateResult<FileInstance> {
        let record = self.insert_sequenced(
            INSTANCES,
            "instances",
            instance,
            |i, id| i.id = id,
            FileInstance::table_key,
        )?;
        debug!(
            file = %record.file_name,
            store_id = record.store_id,
            id = record.id,
            "instance stored"
        );
        Ok(record)
    }

    /// The instance of `file_name` on `store_id`, if any.
    pub fn get_instance_on_store(
        &self,
        store_id: StoreId,
        file_name: &str,
    ) -> StateResult<Option<FileInstance>> {
        self.get_record(INSTANCES, &instance_key(store_id, file_name))
    }

    pub fn get_instance(&self, id: InstanceId) -> StateResult<Option<FileInstance>> {
        Ok(self
            .list_instances()?
            .into_iter()
            .find(|instance| instance.id == id))
    }

    pub fn list_instances(&self) -> StateResult<Vec<FileInstance>> {
        self.scan_records(INSTANCES, "")
    }

    /// All instances on a store, in id order.
    pub fn list_instances_on_store(&self, store_id: StoreId) -> StateResult<Vec<FileInstance>> {
        let mut instances: Vec<FileInstance> =
            self.scan_records(INSTANCES, &format!("{store_id}:"))?;
        instances.sort_by_key(|i| i.id);
        Ok(instances)
    }

    /// Instances on a store created strictly after `cutoff`, in id order.
    pub fn list_instances_on_store_since(
        &self,
        store_id: StoreId,
        cutoff: u64,
    ) -> StateResult<Vec<FileInstance>> {
        let mut instances = self.list_instances_on_store(store_id)?;
        instances.retain(|i| i.created_at > cutoff);
        Ok(instances)
    }

    pub fn list_instances_for_file(&self, file_name: &str) -> StateResult<Vec<FileInstance>> {
        let mut instances: Vec<FileInstance> = self
            .list_instances()?
            .into_iter()
            .filter(|i| i.file_name == file_name)
            .collect();
        instances.sort_by_key(|i| i.id);
        Ok(instances)
    }

    // ── Clone transfers ───────────────────────────────────────────

    /// Record a new transfer attempt, assigning its id.
    pub fn insert_clone_transfer(&self, transfer: CloneTransfer) -> StateResult<CloneTransfer> {
        self.insert_sequenced(
            CLONE_TRANSFERS,
            "clone_transfers",
            transfer,
            |t, id| t.id = id,
            CloneTransfer::table_key,
        )
    }

    /// Persist a transfer's progress. A transfer already stored in a
    /// terminal state cannot be rewritten.
    pub fn put_clone_transfer(&self, transfer: &CloneTransfer) -> StateResult<()> {
        let key = transfer.table_key();
        match self.get_record::<CloneTransfer>(CLONE_TRANSFERS, &key)? {
            None => return Err(StateError::NotFound(format!("clone transfer {}", transfer.id))),
            Some(stored) if stored.status.is_terminal() => {
                return Err(StateError::InvalidTransition {
                    from: stored.status,
                    to: transfer.status,
                });
            }
            Some(_) => {}
        }
        self.put_record(CLONE_TRANSFERS, &key, transfer)?;
        debug!(id = transfer.id, status = ?transfer.status, "clone transfer updated");
        Ok(())
    }

    pub fn get_clone_transfer(&self, id: TransferId) -> StateResult<Option<CloneTransfer>> {
        self.get_record(CLONE_TRANSFERS, &sequence_key(id))
    }

    /// All transfers in id order.
    pub fn list_clone_transfers(&self) -> StateResult<Vec<CloneTransfer>> {
        self.scan_records(CLONE_TRANSFERS, "")
    }

    // ── File events ───────────────────────────────────────────────

    pub fn record_file_event(&self, file_name: &str, event_type: &str) -> StateResult<FileEvent> {
        let event = FileEvent {
            id: 0,
            file_name: file_name.to_string(),
            event_type: event_type.to_string(),
            created_at: epoch_secs(),
        };
        let event = self.insert_sequenced(
            FILE_EVENTS,
            "file_events",
            event,
            |e, id| e.id = id,
            FileEvent::table_key,
        )?;
        debug!(file = %file_name, %event_type, "file event recorded");
        Ok(event)
    }

    pub fn list_file_events(&self, file_name: &str) -> StateResult<Vec<FileEvent>> {
        let events: Vec<FileEvent> = self.scan_records(FILE_EVENTS, &format!("{file_name}:"))?;
        // The prefix also matches names that extend this one past a colon.
        Ok(events
            .into_iter()
            .filter(|e| e.file_name == file_name)
            .collect())
    }

    pub fn has_file_event(&self, file_name: &str, event_type: &str) -> StateResult<bool> {
        Ok(self
            .list_file_events(file_name)?
            .iter()
            .any(|e| e.event_type == event_type))
    }

    // ── Standing orders ───────────────────────────────────────────

    /// Insert a new standing order, assigning its id. Names are unique.
    pub fn insert_standing_order(
        &self,
        order: StandingOrderRecord,
    ) -> StateResult<StandingOrderRecord> {
        let record = self.insert_sequenced(
            STANDING_ORDERS,
            "standing_orders",
            order,
            |o, id| o.id = id,
            |o| o.name.clone(),
        )?;
        debug!(order = %record.name, "standing order created");
        Ok(record)
    }

    /// Replace the order stored under `current_name`, possibly renaming it,
    /// in a single transaction.
    pub fn replace_standing_order(
        &self,
        current_name: &str,
        order: &StandingOrderRecord,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(order).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(STANDING_ORDERS).map_err(map_err!(Table))?;
            if table.get(current_name).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(current_name.to_string()));
            }
            if order.name != current_name {
                if table.get(order.name.as_str()).map_err(map_err!(Read))?.is_some() {
                    return Err(StateError::Conflict(order.name.clone()));
                }
                table.remove(current_name).map_err(map_err!(Write))?;
            }
            table
                .insert(order.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(from = %current_name, to = %order.name, "standing order updated");
        Ok(())
    }

    pub fn get_standing_order(&self, name: &str) -> StateResult<Option<StandingOrderRecord>> {
        self.get_record(STANDING_ORDERS, name)
    }

    /// All standing orders, sorted by name.
    pub fn list_standing_orders(&self) -> StateResult<Vec<StandingOrderRecord>> {
        self.scan_records(STANDING_ORDERS, "")
    }

    /// Delete a standing order by name. Returns true if it existed.
    pub fn delete_standing_order(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove_record(STANDING_ORDERS, name)?;
        debug!(order = %name, existed, "standing order deleted");
        Ok(existed)
    }
}

/// Allocate the next id of a sequence inside an open write transaction.
fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let last = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = last + 1;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store_record(name: &str) -> StoreRecord {
        StoreRecord {
            id: 0,
            name: name.to_string(),
            path_prefix: format!("/data/{name}"),
            ssh_host: None,
            http_prefix: None,
            available: true,
        }
    }

    fn test_file(name: &str) -> FileRecord {
        FileRecord {
            name: name.to_string(),
            file_type: "uv".to_string(),
            source: "correlator".to_string(),
            size: 10,
            obsid: Some(1),
            created_at: 1000,
        }
    }

    fn test_order(name: &str) -> StandingOrderRecord {
        StandingOrderRecord {
            id: 0,
            name: name.to_string(),
            search: r#"{"name-matches": "%.uv"}"#.to_string(),
            conn_name: "offsite".to_string(),
        }
    }

    // ── Stores ─────────────────────────────────────────────────────

    #[test]
    fn ensure_store_is_idempotent() {
        let state = StateStore::open_in_memory().unwrap();
        let first = state.ensure_store(test_store_record("pot")).unwrap();
        let again = state.ensure_store(test_store_record("pot")).unwrap();
        let other = state.ensure_store(test_store_record("mirror")).unwrap();

        assert_eq!(first, again);
        assert_ne!(first.id, other.id);
        assert_eq!(state.list_stores().unwrap().len(), 2);
        assert_eq!(state.get_store(other.id).unwrap(), Some(other));
    }

    #[test]
    fn put_store_requires_existing() {
        let state = StateStore::open_in_memory().unwrap();
        let mut store = test_store_record("pot");
        assert!(matches!(state.put_store(&store), Err(StateError::NotFound(_))));

        store = state.ensure_store(store).unwrap();
        store.available = false;
        state.put_store(&store).unwrap();
        assert!(!state.get_store_by_name("pot").unwrap().unwrap().available);
    }

    // ── Files & instances ──────────────────────────────────────────

    #[test]
    fn observation_put_is_an_upsert() {
        let state = StateStore::open_in_memory().unwrap();
        let mut obs = Observation {
            obsid: 1234567890,
            start_time_jd: 2459000.5,
            stop_time_jd: None,
            start_lst_hr: Some(3.0),
            session_id: None,
        };
        state.put_observation(&obs).unwrap();
        obs.stop_time_jd = Some(2459000.6);
        state.put_observation(&obs).unwrap();

        let listed = state.list_observations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].stop_time_jd, Some(2459000.6));
    }

    #[test]
    fn file_insert_and_conflict() {
        let state = StateStore::open_in_memory().unwrap();
        state.insert_file(&test_file("a.uv")).unwrap();

        assert_eq!(state.get_file("a.uv").unwrap(), Some(test_file("a.uv")));
        assert!(matches!(
            state.insert_file(&test_file("a.uv")),
            Err(StateError::Conflict(_))
        ));
    }

    #[test]
    fn instance_ids_are_sequential_and_unique_per_store() {
        let state = StateStore::open_in_memory().unwrap();
        let a = state
            .insert_instance(FileInstance::new_instance(1, "a.uv", "a.uv", DeletionPolicy::Allowed))
            .unwrap();
        let b = state
            .insert_instance(FileInstance::new_instance(2, "a.uv", "a.uv", DeletionPolicy::Allowed))
            .unwrap();
        assert_eq!(a.id + 1, b.id);

        let dup = state.insert_instance(FileInstance::new_instance(
            1,
            "a.uv",
            "other/a.uv",
            DeletionPolicy::Allowed,
        ));
        assert!(matches!(dup, Err(StateError::Conflict(_))));

        assert_eq!(state.get_instance_on_store(2, "a.uv").unwrap(), Some(b.clone()));
        assert_eq!(state.get_instance(a.id).unwrap(), Some(a));
        assert_eq!(state.list_instances_for_file("a.uv").unwrap().len(), 2);
    }

    #[test]
    fn instances_on_store_prefix_is_exact() {
        let state = StateStore::open_in_memory().unwrap();
        for store_id in [1, 10, 11] {
            state
                .insert_instance(FileInstance::new_instance(
                    store_id,
                    "a.uv",
                    "a.uv",
                    DeletionPolicy::Allowed,
                ))
                .unwrap();
        }
        assert_eq!(state.list_instances_on_store(1).unwrap().len(), 1);
        assert_eq!(state.list_instances_on_store(10).unwrap().len(), 1);
    }

    #[test]
    fn instances_since_filters_by_creation_time() {
        let state = StateStore::open_in_memory().unwrap();
        let mut old = FileInstance::new_instance(1, "old.uv", "old.uv", DeletionPolicy::Allowed);
        old.created_at = 100;
        let mut new = FileInstance::new_instance(1, "new.uv", "new.uv", DeletionPolicy::Allowed);
        new.created_at = 500;
        state.insert_instance(old).unwrap();
        state.insert_instance(new).unwrap();

        let recent = state.list_instances_on_store_since(1, 200).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].file_name, "new.uv");
    }


    // ── Clone transfers ────────────────────────────────────────────

    #[test]
    fn clone_transfer_lifecycle_is_persisted() {
        let state = StateStore::open_in_memory().unwrap();
        let mut transfer = state
            .insert_clone_transfer(CloneTransfer::new_transfer(1, 2, 3))
            .unwrap();
        assert_eq!(transfer.id, 1);

        transfer.mark_staged("local").unwrap();
        state.put_clone_transfer(&transfer).unwrap();
        transfer.complete(9).unwrap();
        state.put_clone_transfer(&transfer).unwrap();

        let stored = state.get_clone_transfer(1).unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Completed);
        assert_eq!(stored.destination_instance_id, Some(9));
    }

    #[test]
    fn terminal_clone_transfer_cannot_be_rewritten() {
        let state = StateStore::open_in_memory().unwrap();
        let mut transfer = state
            .insert_clone_transfer(CloneTransfer::new_transfer(1, 2, 3))
            .unwrap();
        transfer.fail().unwrap();
        state.put_clone_transfer(&transfer).unwrap();

        let mut stale = transfer.clone();
        stale.status = TransferStatus::Pending;
        assert!(matches!(
            state.put_clone_transfer(&stale),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn clone_transfers_list_in_id_order() {
        let state = StateStore::open_in_memory().unwrap();
        for _ in 0..12 {
            state
                .insert_clone_transfer(CloneTransfer::new_transfer(1, 2, 3))
                .unwrap();
        }
        let ids: Vec<u64> = state
            .list_clone_transfers()
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
    }

    // ── File events ────────────────────────────────────────────────

    #[test]
    fn file_events_match_exact_name() {
        let state = StateStore::open_in_memory().unwrap();
        state
            .record_file_event("a", "standing_order_succeeded:x")
            .unwrap();
        state
            .record_file_event("a:b", "standing_order_succeeded:y")
            .unwrap();

        assert!(state.has_file_event("a", "standing_order_succeeded:x").unwrap());
        assert!(!state.has_file_event("a", "standing_order_succeeded:y").unwrap());
        assert_eq!(state.list_file_events("a").unwrap().len(), 1);
    }

    // ── Standing orders ────────────────────────────────────────────

    #[test]
    fn standing_order_crud() {
        let state = StateStore::open_in_memory().unwrap();
        state.insert_standing_order(test_order("nightly")).unwrap();
        state.insert_standing_order(test_order("archive")).unwrap();
        assert!(matches!(
            state.insert_standing_order(test_order("nightly")),
            Err(StateError::Conflict(_))
        ));

        let names: Vec<String> = state
            .list_standing_orders()
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["archive", "nightly"]);

        assert!(state.delete_standing_order("archive").unwrap());
        assert!(!state.delete_standing_order("archive").unwrap());
    }

    #[test]
    fn standing_order_rename() {
        let state = StateStore::open_in_memory().unwrap();
        let mut order = state.insert_standing_order(test_order("nightly")).unwrap();
        state.insert_standing_order(test_order("taken")).unwrap();

        order.name = "taken".to_string();
        assert!(matches!(
            state.replace_standing_order("nightly", &order),
            Err(StateError::Conflict(_))
        ));

        order.name = "weekly".to_string();
        state.replace_standing_order("nightly", &order).unwrap();
        assert!(state.get_standing_order("nightly").unwrap().is_none());
        assert_eq!(state.get_standing_order("weekly").unwrap(), Some(order));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let state = StateStore::open(&db_path).unwrap();
            state.insert_file(&test_file("a.uv")).unwrap();
            state
                .insert_instance(FileInstance::new_instance(1, "a.uv", "a.uv", DeletionPolicy::Allowed))
                .unwrap();
        }

        let state = StateStore::open(&db_path).unwrap();
        assert!(state.get_file("a.uv").unwrap().is_some());
        // The sequence continues where it left off.
        let next = state
            .insert_instance(FileInstance::new_instance(2, "a.uv", "a.uv", DeletionPolicy::Allowed))
            .unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn empty_store_operations() {
        let state = StateStore::open_in_memory().unwrap();

        assert!(state.list_files().unwrap().is_empty());
        assert!(state.list_instances().unwrap().is_empty());
        assert!(state.list_standing_orders().unwrap().is_empty());
        assert!(state.get_store_by_name("nope").unwrap().is_none());
        assert!(state.get_clone_transfer(1).unwrap().is_none());
        assert!(!state.has_file_event("nope", "x").unwrap());
    }
}
