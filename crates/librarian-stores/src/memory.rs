//! In-memory store and transfer manager.
//!
//! Files are tracked by path and size only. Used by tests across the
//! workspace and handy for dry runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::error::{StoreError, StoreResult};
use crate::traits::{StagedArea, StoreManager, TransferManager};

#[derive(Debug, Default)]
struct Contents {
    files: HashMap<PathBuf, u64>,
    /// staging id → (staging path, reserved bytes)
    staged: HashMap<String, (PathBuf, u64)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Contents>,
    capacity: Option<u64>,
    next_staging: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Contents> {
        self.contents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_file(&self, path: impl Into<PathBuf>, size: u64) {
        self.lock().files.insert(path.into(), size);
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock().files.contains_key(path.as_ref())
    }

    /// Number of staging areas currently held.
    pub fn staged_count(&self) -> usize {
        self.lock().staged.len()
    }

    fn used(contents: &Contents) -> u64 {
        contents.files.values().sum::<u64>() + contents.staged.values().map(|(_, n)| n).sum::<u64>()
    }
}

impl StoreManager for MemoryStore {
    fn stage(&self, file_size: u64, file_name: &str) -> StoreResult<StagedArea> {
        let mut contents = self.lock();
        if let Some(capacity) = self.capacity {
            let available = capacity.saturating_sub(Self::used(&contents));
            if file_size > available {
                return Err(StoreError::InsufficientCapacity {
                    needed: file_size,
                    available,
                });
            }
        }
        let id = format!("staging-{}", self.next_staging.fetch_add(1, Ordering::Relaxed));
        let path = PathBuf::from("/staging").join(&id).join(file_name);
        contents.staged.insert(id.clone(), (path.clone(), file_size));
        Ok(StagedArea { id, path })
    }

    fn transfer_out(
        &self,
        store_path: &Path,
        destination: &Path,
        using: &dyn TransferManager,
    ) -> StoreResult<bool> {
        if !self.contains(store_path) {
            return Err(StoreError::NotFound(store_path.to_path_buf()));
        }
        using.transfer(store_path, destination)
    }

    fn commit(&self, staging_path: &Path, store_path: &Path) -> StoreResult<()> {
        let mut contents = self.lock();
        if contents.files.contains_key(store_path) {
            return Err(StoreError::AlreadyExists(store_path.to_path_buf()));
        }
        let size = contents
            .staged
            .values()
            .find(|(path, _)| path == staging_path)
            .map(|(_, size)| *size)
            .ok_or_else(|| StoreError::NotFound(staging_path.to_path_buf()))?;
        contents.files.insert(store_path.to_path_buf(), size);
        Ok(())
    }

    fn unstage(&self, staging_id: &str) -> StoreResult<()> {
        self.lock().staged.remove(staging_id);
        Ok(())
    }
}

/// Transfer manager that records calls and reports a fixed outcome.
#[derive(Debug)]
pub struct MemoryTransfer {
    name: String,
    succeed: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryTransfer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            succeed: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        let transfer = Self::new(name);
        transfer.set_succeed(false);
        transfer
    }

    pub fn set_succeed(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransferManager for MemoryTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self, _source: &Path, _destination: &Path) -> StoreResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.succeed.load(Ordering::SeqCst))
    }
}
