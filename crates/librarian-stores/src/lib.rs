//! librarian-stores — what the replication engine needs from a store.
//!
//! The engine only talks to stores through [`StoreManager`] (stage, transfer
//! out, commit, unstage) and moves bytes with [`TransferManager`]s. This
//! crate defines that contract, the [`StoreRegistry`] of configured stores,
//! a local-filesystem backend and an in-memory backend.

pub mod error;
pub mod local;
pub mod memory;
pub mod registry;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use local::{LocalCopy, LocalStore};
pub use memory::{MemoryStore, MemoryTransfer};
pub use registry::{StoreHandle, StoreRegistry};
pub use traits::{StagedArea, StoreManager, TransferManager, TransferManagers, try_transfer_managers};
