//! librarian-state — embedded metadata store for the Librarian.
//!
//! One redb file holds every record the replication engine reads or writes:
//! observations, files and their instances, stores, clone transfers, file
//! events and standing orders. Values are JSON; keys are chosen so related
//! rows sit next to each other (`{store_id}:{file_name}` for instances,
//! `{file_name}:{event_id}` for events) and can be read with a prefix scan.
//!
//! Ids come from a sequence table bumped in the same write transaction as
//! the insert, so an id never outlives a rolled-back record. Each public
//! call is one transaction. `StateStore` is a cheap `Clone` around
//! `Arc<Database>`.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
