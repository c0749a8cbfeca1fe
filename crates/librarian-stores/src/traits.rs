//! The store capability contract.
//!
//! All operations are blocking. Staging, committing and unstaging are cheap
//! metadata-sized operations; byte transfers may take arbitrarily long and
//! are expected to run on a worker thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// A provisional holding area reserved on a destination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArea {
    /// Handle passed back to [`StoreManager::unstage`].
    pub id: String,
    /// Where the incoming bytes must be written.
    pub path: PathBuf,
}

/// Byte-level operations on one store.
pub trait StoreManager: Send + Sync {
    /// Reserve staging space for a file.
    ///
    /// Fails with [`StoreError::InsufficientCapacity`] rather than waiting
    /// when the store cannot fit `file_size` bytes.
    fn stage(&self, file_size: u64, file_name: &str) -> StoreResult<StagedArea>;

    /// Copy `store_path` (relative to this store) to `destination` using the
    /// given transfer manager.
    ///
    /// Fails with [`StoreError::NotFound`] if `store_path` does not exist
    /// here. `Ok(false)` means the transfer manager reported failure.
    fn transfer_out(
        &self,
        store_path: &Path,
        destination: &Path,
        using: &dyn TransferManager,
    ) -> StoreResult<bool>;

    /// Move staged content into the store's namespace at `store_path`.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the target is taken.
    fn commit(&self, staging_path: &Path, store_path: &Path) -> StoreResult<()>;

    /// Release a staging area. Unknown ids are ignored.
    fn unstage(&self, staging_id: &str) -> StoreResult<()>;
}

/// A mechanism for moving bytes between two paths.
pub trait TransferManager: Send + Sync {
    fn name(&self) -> &str;

    fn transfer(&self, source: &Path, destination: &Path) -> StoreResult<bool>;
}

/// Named transfer managers in the order they are tried.
pub type TransferManagers = Vec<(String, Arc<dyn TransferManager>)>;

/// Transfer `store_path` off `source` into `destination`, trying each
/// manager once in order.
///
/// Returns the name of the first manager that succeeded, or `None` when all
/// of them failed. No manager is tried after one succeeds. A missing source
/// file is returned as an error immediately since no other manager could
/// find it either.
pub fn try_transfer_managers(
    source: &dyn StoreManager,
    store_path: &Path,
    destination: &Path,
    managers: &[(String, Arc<dyn TransferManager>)],
) -> StoreResult<Option<String>> {
    for (name, manager) in managers {
        match source.transfer_out(store_path, destination, manager.as_ref()) {
            Ok(true) => {
                debug!(path = %store_path.display(), manager = %name, "transfer succeeded");
                return Ok(Some(name.clone()));
            }
            Ok(false) => {
                debug!(path = %store_path.display(), manager = %name, "transfer manager reported failure");
            }
            Err(e @ StoreError::NotFound(_)) => return Err(e),
            Err(e) => {
                warn!(path = %store_path.display(), manager = %name, error = %e, "transfer manager errored");
            }
        }
    }
    Ok(None)
}
