//! Named stores with their capabilities.

use std::collections::BTreeMap;
use std::sync::Arc;

use librarian_core::{LibrarianConfig, StoreConfig};
use librarian_state::{StateStore, StoreRecord};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::local::{LocalCopy, LocalStore};
use crate::traits::{StoreManager, TransferManager, TransferManagers};

/// A persisted store paired with the capability objects that act on it.
#[derive(Clone)]
pub struct StoreHandle {
    pub record: StoreRecord,
    pub manager: Arc<dyn StoreManager>,
    /// Managers usable to move bytes into this store, in the order tried.
    pub transfer_managers: TransferManagers,
}

impl StoreHandle {
    pub fn new(record: StoreRecord, manager: Arc<dyn StoreManager>) -> Self {
        Self {
            record,
            manager,
            transfer_managers: Vec::new(),
        }
    }

    pub fn with_transfer_manager(mut self, manager: Arc<dyn TransferManager>) -> Self {
        self.transfer_managers
            .push((manager.name().to_string(), manager));
        self
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("record", &self.record)
            .field(
                "transfer_managers",
                &self.transfer_managers.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// All stores known to this process, by name.
#[derive(Debug, Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, StoreHandle>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: StoreHandle) {
        self.stores.insert(handle.record.name.clone(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&StoreHandle> {
        self.stores.get(name)
    }

    pub fn by_id(&self, id: u64) -> Option<&StoreHandle> {
        self.stores.values().find(|h| h.record.id == id)
    }

    /// Persist every configured store that is not yet known and build a
    /// local-filesystem handle for each.
    ///
    /// Existing records are reused, never duplicated; their availability is
    /// refreshed from the configuration.
    pub fn bootstrap(config: &LibrarianConfig, state: &StateStore) -> StoreResult<Self> {
        let mut registry = Self::new();
        for (name, store_config) in &config.stores {
            let record = ensure_store_record(state, name, store_config)?;
            let manager = Arc::new(LocalStore::new(
                &store_config.path_prefix,
                store_config.capacity_bytes,
            ));
            let mut handle = StoreHandle::new(record, manager);
            for tm_name in &store_config.transfer_managers {
                handle = handle.with_transfer_manager(transfer_manager_by_name(tm_name)?);
            }
            debug!(store = %name, managers = handle.transfer_managers.len(), "store ready");
            registry.insert(handle);
        }
        info!(stores = registry.stores.len(), "stores bootstrapped");
        Ok(registry)
    }
}

fn ensure_store_record(
    state: &StateStore,
    name: &str,
    config: &StoreConfig,
) -> StoreResult<StoreRecord> {
    let mut record = state.ensure_store(StoreRecord {
        id: 0,
        name: name.to_string(),
        path_prefix: config.path_prefix.clone(),
        ssh_host: config.ssh_host.clone(),
        http_prefix: config.http_prefix.clone(),
        available: config.available,
    })?;
    if record.available != config.available {
        record.available = config.available;
        state.put_store(&record)?;
    }
    Ok(record)
}

fn transfer_manager_by_name(name: &str) -> StoreResult<Arc<dyn TransferManager>> {
    match name {
        LocalCopy::NAME => Ok(Arc::new(LocalCopy)),
        other => Err(StoreError::Config(format!("unknown transfer manager {other:?}"))),
    }
}
