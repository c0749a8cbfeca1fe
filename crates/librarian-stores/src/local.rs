//! Local-filesystem store.
//!
//! Files live under `root`; staging areas are directories under
//! `root/.staging/<id>/`. Capacity, when configured, bounds the bytes of
//! committed files plus the size reserved by every open staging area.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use librarian_state::epoch_secs;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{StagedArea, StoreManager, TransferManager};

const STAGING_DIR: &str = ".staging";

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    capacity: Option<u64>,
    next_staging: AtomicU64,
    /// staging id → bytes reserved until commit or unstage
    reserved: Mutex<HashMap<String, u64>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, capacity: Option<u64>) -> Self {
        Self {
            root: root.into(),
            capacity,
            next_staging: AtomicU64::new(0),
            reserved: Mutex::new(HashMap::new()),
        }
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn reservations(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.reserved.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The staging id owning `staging_path`, if it lies under `.staging/`.
    fn staging_id_of(&self, staging_path: &Path) -> Option<String> {
        let relative = staging_path.strip_prefix(self.staging_root()).ok()?;
        match relative.components().next()? {
            Component::Normal(id) => id.to_str().map(str::to_string),
            _ => None,
        }
    }

    /// Resolve a store-relative path, refusing anything that escapes `root`.
    fn resolve(&self, store_path: &Path) -> StoreResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in store_path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(StoreError::Config(format!(
                        "path escapes store root: {}",
                        store_path.display()
                    )));
                }
            }
        }
        Ok(resolved)
    }

    /// Total bytes of regular files under the root, staging areas excluded.
    fn used_bytes(&self) -> u64 {
        let staging = self.staging_root();
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| entry.path() != staging)
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }
}

impl StoreManager for LocalStore {
    fn stage(&self, file_size: u64, file_name: &str) -> StoreResult<StagedArea> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| StoreError::Config(format!("invalid file name: {file_name:?}")))?;

        // Held across the check and the insert so concurrent stages see
        // each other's reservations.
        let mut reserved = self.reservations();
        if let Some(capacity) = self.capacity {
            let in_use = self.used_bytes() + reserved.values().sum::<u64>();
            let available = capacity.saturating_sub(in_use);
            if file_size > available {
                return Err(StoreError::InsufficientCapacity {
                    needed: file_size,
                    available,
                });
            }
        }

        let seq = self.next_staging.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{seq}", epoch_secs());
        let dir = self.staging_root().join(&id);
        fs::create_dir_all(&dir)?;
        reserved.insert(id.clone(), file_size);
        drop(reserved);

        debug!(root = %self.root.display(), %id, file_size, "staged");
        Ok(StagedArea {
            path: dir.join(name),
            id,
        })
    }

    fn transfer_out(
        &self,
        store_path: &Path,
        destination: &Path,
        using: &dyn TransferManager,
    ) -> StoreResult<bool> {
        let source = self.resolve(store_path)?;
        if !source.exists() {
            return Err(StoreError::NotFound(store_path.to_path_buf()));
        }
        using.transfer(&source, destination)
    }

    fn commit(&self, staging_path: &Path, store_path: &Path) -> StoreResult<()> {
        let target = self.resolve(store_path)?;
        if target.exists() {
            return Err(StoreError::AlreadyExists(store_path.to_path_buf()));
        }
        if !staging_path.exists() {
            return Err(StoreError::NotFound(staging_path.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staging_path, &target)?;
        // The bytes now count as a committed file.
        if let Some(id) = self.staging_id_of(staging_path) {
            self.reservations().remove(&id);
        }
        debug!(path = %target.display(), "committed");
        Ok(())
    }

    fn unstage(&self, staging_id: &str) -> StoreResult<()> {
        if staging_id.is_empty() || staging_id.contains(['/', '\\']) || staging_id.starts_with('.') {
            return Err(StoreError::Config(format!("invalid staging id: {staging_id:?}")));
        }
        let dir = self.staging_root().join(staging_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        self.reservations().remove(staging_id);
        Ok(())
    }
}

/// Plain file copy between two local paths.
#[derive(Debug, Default)]
pub struct LocalCopy;

impl LocalCopy {
    pub const NAME: &'static str = "local";
}

impl TransferManager for LocalCopy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transfer(&self, source: &Path, destination: &Path) -> StoreResult<bool> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(source, destination).map_err(|e| {
            StoreError::Transfer(format!(
                "copy {} -> {}: {e}",
                source.display(),
                destination.display()
            ))
        })?;
        debug!(from = %source.display(), to = %destination.display(), bytes, "copied");
        Ok(true)
    }
}
