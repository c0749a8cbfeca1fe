//! Clone orchestrator error types.

use librarian_state::StateError;
use librarian_stores::StoreError;
use librarian_tasks::TaskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloneError {
    /// A configured store does not exist. Fatal to the job.
    #[error("store {0} does not exist")]
    Configuration(String),

    #[error("{file} does not fit on store {store}: need {needed} bytes, {available} available")]
    Capacity {
        file: String,
        store: String,
        needed: u64,
        available: u64,
    },

    #[error("transfer of {file} failed: {reason}")]
    Transport { file: String, reason: String },

    /// The commit target already exists, most likely written by another
    /// replication path.
    #[error("{file} already exists on store {store}")]
    Conflict { file: String, store: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("task error: {0}")]
    Task(#[from] TaskError),
}

pub type CloneResult<T> = Result<T, CloneError>;
