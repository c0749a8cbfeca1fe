//! Store capability errors.

use std::path::PathBuf;

use librarian_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot stage a file of this size.
    #[error("insufficient capacity: need {needed} bytes, {available} available")]
    InsufficientCapacity { needed: u64, available: u64 },

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A transfer manager could not move the bytes.
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
