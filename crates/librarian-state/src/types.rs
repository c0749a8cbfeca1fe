//! Domain types for the Librarian metadata store.
//!
//! These types represent the persisted state of observations, files, their
//! physical instances, stores, and the audit records written by the
//! replication engine. All types are serializable to/from JSON for storage
//! in redb tables.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{StateError, StateResult};

/// Numeric identifier of a store.
pub type StoreId = u64;

/// Numeric identifier of a file instance.
pub type InstanceId = u64;

/// Numeric identifier of a clone transfer.
pub type TransferId = u64;

/// Observation identifier.
pub type ObsId = i64;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Event type prefix marking a file as delivered by a standing order.
pub const STANDING_ORDER_SUCCEEDED: &str = "standing_order_succeeded";

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Store ─────────────────────────────────────────────────────────

/// A named storage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreRecord {
    pub id: StoreId,
    pub name: String,
    /// Filesystem prefix that instance paths are relative to.
    pub path_prefix: String,
    pub ssh_host: Option<String>,
    pub http_prefix: Option<String>,
    /// Unavailable stores are never used as copy sources.
    pub available: bool,
}

// ── Observation ───────────────────────────────────────────────────

/// An observing session that files belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub obsid: ObsId,
    pub start_time_jd: f64,
    pub stop_time_jd: Option<f64>,
    pub start_lst_hr: Option<f64>,
    pub session_id: Option<i64>,
}

impl Observation {
    /// Duration in days, known once the stop time is recorded.
    pub fn duration(&self) -> Option<f64> {
        self.stop_time_jd.map(|stop| stop - self.start_time_jd)
    }

    pub fn table_key(&self) -> String {
        self.obsid.to_string()
    }
}

// ── File ──────────────────────────────────────────────────────────

/// A logical file, identified by its unique name. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub source: String,
    /// Size in bytes.
    pub size: u64,
    pub obsid: Option<ObsId>,
    /// Unix timestamp (seconds) when the file was registered.
    pub created_at: u64,
}

/// Whether an instance may be deleted from its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    Disallowed,
    Allowed,
}

/// One physical copy of a file on a store. Unique per (store, file).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInstance {
    /// Assigned by the store on insert.
    pub id: InstanceId,
    pub store_id: StoreId,
    pub file_name: String,
    /// Path relative to the store's `path_prefix`.
    pub path: String,
    pub deletion_policy: DeletionPolicy,
    pub created_at: u64,
}

impl FileInstance {
    pub fn new_instance(
        store_id: StoreId,
        file_name: &str,
        path: &str,
        deletion_policy: DeletionPolicy,
    ) -> Self {
        Self {
            id: 0,
            store_id,
            file_name: file_name.to_string(),
            path: path.to_string(),
            deletion_policy,
            created_at: epoch_secs(),
        }
    }

    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        instance_key(self.store_id, &self.file_name)
    }

    /// Absolute path of this instance given the store it lives on.
    pub fn full_path_on_store(&self, store: &StoreRecord) -> String {
        format!(
            "{}/{}",
            store.path_prefix.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

pub(crate) fn instance_key(store_id: StoreId, file_name: &str) -> String {
    format!("{store_id}:{file_name}")
}

// ── Clone transfer ────────────────────────────────────────────────

/// State of one replication attempt.
///
/// `Pending → Staged → Completed`, with `Failed` reachable from `Pending`
/// and `Staged`. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Staged,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Staged)
                | (Self::Pending, Self::Failed)
                | (Self::Staged, Self::Completed)
                | (Self::Staged, Self::Failed)
        )
    }
}

/// One attempt to replicate a source instance onto a destination store.
///
/// A retried attempt is a new record; failed records are never resumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneTransfer {
    pub id: TransferId,
    pub source_store_id: StoreId,
    pub destination_store_id: StoreId,
    pub source_instance_id: InstanceId,
    pub destination_instance_id: Option<InstanceId>,
    /// Transfer manager that moved the bytes, once one succeeded.
    pub transfer_manager_name: Option<String>,
    pub status: TransferStatus,
    pub started_at: u64,
    pub ended_at: Option<u64>,
}

impl CloneTransfer {
    pub fn new_transfer(
        source_store_id: StoreId,
        destination_store_id: StoreId,
        source_instance_id: InstanceId,
    ) -> Self {
        Self {
            id: 0,
            source_store_id,
            destination_store_id,
            source_instance_id,
            destination_instance_id: None,
            transfer_manager_name: None,
            status: TransferStatus::Pending,
            started_at: epoch_secs(),
            ended_at: None,
        }
    }

    pub fn table_key(&self) -> String {
        sequence_key(self.id)
    }

    fn transition(&mut self, next: TransferStatus) -> StateResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Bytes are in the destination's staging area.
    pub fn mark_staged(&mut self, transfer_manager_name: &str) -> StateResult<()> {
        self.transition(TransferStatus::Staged)?;
        self.transfer_manager_name = Some(transfer_manager_name.to_string());
        Ok(())
    }

    pub fn complete(&mut self, destination_instance_id: InstanceId) -> StateResult<()> {
        self.transition(TransferStatus::Completed)?;
        self.destination_instance_id = Some(destination_instance_id);
        self.ended_at = Some(epoch_secs());
        Ok(())
    }

    pub fn fail(&mut self) -> StateResult<()> {
        self.transition(TransferStatus::Failed)?;
        self.ended_at = Some(epoch_secs());
        Ok(())
    }
}

pub(crate) fn sequence_key(id: u64) -> String {
    format!("{id:020}")
}

// ── File event ────────────────────────────────────────────────────

/// Immutable milestone marker attached to a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEvent {
    pub id: u64,
    pub file_name: String,
    pub event_type: String,
    pub created_at: u64,
}

impl FileEvent {
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.file_name, sequence_key(self.id))
    }
}

// ── Standing order ────────────────────────────────────────────────

/// Persisted standing-order row. Validation lives with the order logic;
/// this type is only the stored shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandingOrderRecord {
    pub id: u64,
    pub name: String,
    /// JSON search text, comments allowed.
    pub search: String,
    /// Name of the destination connection.
    pub conn_name: String,
}
