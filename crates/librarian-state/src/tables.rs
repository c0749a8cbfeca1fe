//! redb table definitions for the Librarian metadata store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Zero-padded numeric keys keep id order equal to key order.

use redb::TableDefinition;

/// Observations keyed by `{obsid}`.
pub const OBSERVATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("observations");

/// Files keyed by their unique name.
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Stores keyed by their unique name.
pub const STORES: TableDefinition<&str, &[u8]> = TableDefinition::new("stores");

/// File instances keyed by `{store_id}:{file_name}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Clone transfers keyed by zero-padded `{id}`.
pub const CLONE_TRANSFERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("clone_transfers");

/// File events keyed by `{file_name}:{id}`.
pub const FILE_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("file_events");

/// Standing orders keyed by their unique name.
pub const STANDING_ORDERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("standing_orders");

/// Last allocated id per sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
