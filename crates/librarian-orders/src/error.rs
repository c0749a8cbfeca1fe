//! Standing-order error types.

use librarian_search::SearchError;
use librarian_state::StateError;
use librarian_stores::StoreError;
use librarian_tasks::TaskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    /// The order's search does not compile.
    #[error(transparent)]
    Parse(#[from] SearchError),

    #[error("invalid standing order: {0}")]
    Invalid(String),

    #[error("no such standing order \"{0}\"")]
    NotFound(String),

    #[error("standing order \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("unknown connection \"{0}\"")]
    UnknownConnection(String),

    /// A connection points at a store this process does not know.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("task error: {0}")]
    Task(#[from] TaskError),
}

pub type OrderResult<T> = Result<T, OrderError>;
