//! Copy tasks: background copies of one file onto a connection's store.
//!
//! The task list doubles as the record of which files a standing order has
//! already set in motion. A task that ended with an exception no longer
//! counts, so its file is picked up again on the next evaluation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use librarian_core::LibrarianConfig;
use librarian_state::{DeletionPolicy, FileInstance, StateError, StateStore, StoreId};
use librarian_stores::{StoreHandle, StoreRegistry, try_transfer_managers};
use librarian_tasks::{TaskResult, TaskRunner};
use tracing::{debug, error, info, warn};

use crate::error::{OrderError, OrderResult};
use crate::order::succeeded_event_type;

/// One requested copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyTask {
    pub id: u64,
    pub file_name: String,
    /// Destination path, relative to the destination store.
    pub store_path: String,
    pub standing_order_name: Option<String>,
    /// Set when the copy failed.
    pub exception: Option<String>,
    pub finished: bool,
}

/// Result of asking for a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    /// No store holds an instance to copy from.
    NoInstance,
    /// The destination already has the file.
    AlreadyPresent,
}

/// Launches copies on behalf of standing orders.
pub trait CopyLauncher: Send + Sync {
    fn launch_copy(
        &self,
        file_name: &str,
        conn_name: &str,
        standing_order_name: Option<&str>,
    ) -> OrderResult<LaunchOutcome>;

    /// Base names of the destination paths of every task for this order
    /// that is still running or has succeeded.
    fn launched_for(&self, standing_order_name: &str) -> HashSet<String>;

    /// Forget tasks that have finished.
    fn prune_finished(&self) {}
}

/// Copies files between the stores of this process's registry.
pub struct CopyTaskManager {
    state: StateStore,
    stores: Arc<StoreRegistry>,
    /// connection name → destination store name
    connections: BTreeMap<String, String>,
    runner: TaskRunner,
    tasks: Arc<Mutex<Vec<CopyTask>>>,
    next_id: AtomicU64,
}

fn lock(tasks: &Mutex<Vec<CopyTask>>) -> MutexGuard<'_, Vec<CopyTask>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CopyTaskManager {
    pub fn new(
        state: StateStore,
        stores: Arc<StoreRegistry>,
        connections: BTreeMap<String, String>,
        runner: TaskRunner,
    ) -> Self {
        Self {
            state,
            stores,
            connections,
            runner,
            tasks: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(
        config: &LibrarianConfig,
        state: StateStore,
        stores: Arc<StoreRegistry>,
        runner: TaskRunner,
    ) -> Self {
        let connections = config
            .connections
            .iter()
            .map(|(name, conn)| (name.clone(), conn.store.clone()))
            .collect();
        Self::new(state, stores, connections, runner)
    }

    /// Snapshot of the task list.
    pub fn tasks(&self) -> Vec<CopyTask> {
        lock(&self.tasks).clone()
    }

    fn destination(&self, conn_name: &str) -> OrderResult<&StoreHandle> {
        let store_name = self
            .connections
            .get(conn_name)
            .ok_or_else(|| OrderError::UnknownConnection(conn_name.to_string()))?;
        self.stores.get(store_name).ok_or_else(|| {
            OrderError::Configuration(format!(
                "connection \"{conn_name}\" points at unknown store \"{store_name}\""
            ))
        })
    }

    /// First available instance of the file that is not on `dest`.
    fn source_for(
        &self,
        file_name: &str,
        dest: &StoreHandle,
    ) -> OrderResult<Option<(FileInstance, &StoreHandle)>> {
        for instance in self.state.list_instances_for_file(file_name)? {
            if instance.store_id == dest.record.id {
                continue;
            }
            let handle = self.stores.by_id(instance.store_id);
            if let Some(handle) = handle.filter(|h| h.record.available) {
                return Ok(Some((instance, handle)));
            }
        }
        Ok(None)
    }
}

impl CopyLauncher for CopyTaskManager {
    fn launch_copy(
        &self,
        file_name: &str,
        conn_name: &str,
        standing_order_name: Option<&str>,
    ) -> OrderResult<LaunchOutcome> {
        let dest = self.destination(conn_name)?;

        if self
            .state
            .get_instance_on_store(dest.record.id, file_name)?
            .is_some()
        {
            debug!(file = %file_name, store = %dest.name(), "already on destination");
            if let Some(order) = standing_order_name {
                self.state
                    .record_file_event(file_name, &succeeded_event_type(order))?;
            }
            return Ok(LaunchOutcome::AlreadyPresent);
        }

        let Some((source_instance, source)) = self.source_for(file_name, dest)? else {
            return Ok(LaunchOutcome::NoInstance);
        };
        let file = self
            .state
            .get_file(file_name)?
            .ok_or_else(|| StateError::NotFound(format!("file {file_name}")))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.tasks).push(CopyTask {
            id,
            file_name: file_name.to_string(),
            store_path: file_name.to_string(),
            standing_order_name: standing_order_name.map(str::to_string),
            exception: None,
            finished: false,
        });

        let work = {
            let dest_manager = dest.manager.clone();
            let source_manager = source.manager.clone();
            let managers = dest.transfer_managers.clone();
            let source_path = PathBuf::from(&source_instance.path);
            let store_path = PathBuf::from(file_name);
            let (size, name) = (file.size, file.name.clone());
            move || -> anyhow::Result<String> {
                let area = dest_manager.stage(size, &name)?;
                let copied = try_transfer_managers(
                    source_manager.as_ref(),
                    &source_path,
                    &area.path,
                    &managers,
                )
                .map_err(anyhow::Error::from)
                .and_then(|winner| {
                    let winner =
                        winner.ok_or_else(|| anyhow::anyhow!("no transfer manager succeeded"))?;
                    dest_manager.commit(&area.path, &store_path)?;
                    Ok(winner)
                });
                if let Err(e) = dest_manager.unstage(&area.id) {
                    warn!(staging_id = %area.id, error = %e, "failed to release staging area");
                }
                copied
            }
        };

        let wrapup = {
            let state = self.state.clone();
            let tasks = self.tasks.clone();
            let dest_id = dest.record.id;
            let dest_name = dest.name().to_string();
            let file_name = file_name.to_string();
            let order = standing_order_name.map(str::to_string);
            let policy = source_instance.deletion_policy;
            move |outcome: TaskResult<String>| async move {
                let result = match outcome {
                    Ok(manager) => {
                        record_copy(&state, dest_id, &file_name, policy, order.as_deref())
                            .map(|_| manager)
                    }
                    Err(e) => Err(e.into()),
                };
                match &result {
                    Ok(manager) => info!(
                        file = %file_name,
                        store = %dest_name,
                        %manager,
                        order = order.as_deref().unwrap_or("-"),
                        "copy completed"
                    ),
                    Err(e) => error!(file = %file_name, store = %dest_name, error = %e, "copy failed"),
                }
                let mut tasks = lock(&tasks);
                if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
                    task.finished = true;
                    task.exception = result.err().map(|e| e.to_string());
                }
            }
        };

        if let Err(e) = self.runner.launch(work, wrapup) {
            if let Some(task) = lock(&self.tasks).iter_mut().find(|t| t.id == id) {
                task.finished = true;
                task.exception = Some(e.to_string());
            }
            return Err(e.into());
        }
        debug!(file = %file_name, store = %dest.name(), task = id, "copy launched");
        Ok(LaunchOutcome::Launched)
    }

    fn launched_for(&self, standing_order_name: &str) -> HashSet<String> {
        lock(&self.tasks)
            .iter()
            .filter(|t| {
                t.standing_order_name.as_deref() == Some(standing_order_name)
                    && t.exception.is_none()
            })
            .filter_map(|t| {
                Path::new(&t.store_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .collect()
    }

    fn prune_finished(&self) {
        let mut tasks = lock(&self.tasks);
        let before = tasks.len();
        tasks.retain(|t| !t.finished);
        if tasks.len() != before {
            debug!(pruned = before - tasks.len(), "finished copy tasks pruned");
        }
    }
}

/// Record a finished copy: the new instance, and the order's marker event.
fn record_copy(
    state: &StateStore,
    store_id: StoreId,
    file_name: &str,
    policy: DeletionPolicy,
    standing_order_name: Option<&str>,
) -> OrderResult<()> {
    state.insert_instance(FileInstance::new_instance(store_id, file_name, file_name, policy))?;
    if let Some(order) = standing_order_name {
        state.record_file_event(file_name, &succeeded_event_type(order))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use librarian_state::{FileRecord, StoreRecord, epoch_secs};
    use librarian_stores::{MemoryStore, MemoryTransfer, StoreManager, TransferManager};
    use librarian_tasks::ControlLoop;
    use tokio::sync::watch;

    struct Fixture {
        state: StateStore,
        source: Arc<MemoryStore>,
        dest: Arc<MemoryStore>,
        transfer: Arc<MemoryTransfer>,
        copies: CopyTaskManager,
        runner: TaskRunner,
        _shutdown: watch::Sender<bool>,
    }

    fn test_store_record(name: &str) -> StoreRecord {
        StoreRecord {
            id: 0,
            name: name.to_string(),
            path_prefix: format!("/data/{name}"),
            ssh_host: None,
            http_prefix: None,
            available: true,
        }
    }

    fn fixture() -> Fixture {
        let state = StateStore::open_in_memory().unwrap();
        let onsite = state.ensure_store(test_store_record("onsite")).unwrap();
        let offsite = state.ensure_store(test_store_record("offsite")).unwrap();
        let source = Arc::new(MemoryStore::new());
        let dest = Arc::new(MemoryStore::new());
        let transfer = Arc::new(MemoryTransfer::new("local"));

        let mut registry = StoreRegistry::new();
        registry.insert(StoreHandle::new(onsite, source.clone() as Arc<dyn StoreManager>));
        registry.insert(
            StoreHandle::new(offsite, dest.clone() as Arc<dyn StoreManager>)
                .with_transfer_manager(transfer.clone() as Arc<dyn TransferManager>),
        );

        let control = ControlLoop::new(16);
        let runner = TaskRunner::new(2, control.handle());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(control.run(shutdown_rx));

        let mut connections = BTreeMap::new();
        connections.insert("nrao".to_string(), "offsite".to_string());
        let copies = CopyTaskManager::new(state.clone(), Arc::new(registry), connections, runner.clone());
        Fixture {
            state,
            source,
            dest,
            transfer,
            copies,
            runner,
            _shutdown: shutdown_tx,
        }
    }

    impl Fixture {
        fn upload(&self, name: &str) {
            self.state
                .insert_file(&FileRecord {
                    name: name.to_string(),
                    file_type: "uv".to_string(),
                    source: "correlator".to_string(),
                    size: 10,
                    obsid: None,
                    created_at: epoch_secs(),
                })
                .unwrap();
            let onsite = self.state.get_store_by_name("onsite").unwrap().unwrap();
            self.state
                .insert_instance(FileInstance::new_instance(
                    onsite.id,
                    name,
                    name,
                    DeletionPolicy::Allowed,
                ))
                .unwrap();
            self.source.insert_file(name, 10);
        }

        /// Wait for background work and its wrap-ups.
        async fn settle(&self) {
            self.runner.shutdown().await;
            self.runner.control().call(|| async {}).await.unwrap();
        }
    }

    #[tokio::test]
    async fn successful_copy_records_instance_and_event() {
        let fx = fixture();
        fx.upload("a.uv");

        let outcome = fx.copies.launch_copy("a.uv", "nrao", Some("nightly")).unwrap();
        assert_eq!(outcome, LaunchOutcome::Launched);
        assert!(fx.copies.launched_for("nightly").contains("a.uv"));
        fx.settle().await;

        let offsite = fx.state.get_store_by_name("offsite").unwrap().unwrap();
        assert!(fx.state.get_instance_on_store(offsite.id, "a.uv").unwrap().is_some());
        assert!(fx.dest.contains("a.uv"));
        assert!(
            fx.state
                .has_file_event("a.uv", "standing_order_succeeded:nightly")
                .unwrap()
        );
        let tasks = fx.copies.tasks();
        assert!(tasks[0].finished);
        assert_eq!(tasks[0].exception, None);

        fx.copies.prune_finished();
        assert!(fx.copies.tasks().is_empty());
    }

    #[tokio::test]
    async fn failed_copy_is_eligible_for_retry() {
        let fx = fixture();
        fx.upload("a.uv");
        fx.transfer.set_succeed(false);

        fx.copies.launch_copy("a.uv", "nrao", Some("nightly")).unwrap();
        fx.settle().await;

        let tasks = fx.copies.tasks();
        assert!(tasks[0].exception.as_deref().unwrap().contains("no transfer manager succeeded"));
        assert!(fx.copies.launched_for("nightly").is_empty());
        assert!(!fx.state.has_file_event("a.uv", "standing_order_succeeded:nightly").unwrap());
        assert_eq!(fx.dest.staged_count(), 0);
    }

    #[tokio::test]
    async fn no_instance_and_already_present() {
        let fx = fixture();
        fx.state
            .insert_file(&FileRecord {
                name: "pending.uv".to_string(),
                file_type: "uv".to_string(),
                source: "correlator".to_string(),
                size: 1,
                obsid: None,
                created_at: epoch_secs(),
            })
            .unwrap();
        assert_eq!(
            fx.copies.launch_copy("pending.uv", "nrao", Some("nightly")).unwrap(),
            LaunchOutcome::NoInstance
        );

        fx.upload("a.uv");
        let offsite = fx.state.get_store_by_name("offsite").unwrap().unwrap();
        fx.state
            .insert_instance(FileInstance::new_instance(offsite.id, "a.uv", "a.uv", DeletionPolicy::Allowed))
            .unwrap();
        assert_eq!(
            fx.copies.launch_copy("a.uv", "nrao", Some("nightly")).unwrap(),
            LaunchOutcome::AlreadyPresent
        );
        assert!(fx.state.has_file_event("a.uv", "standing_order_succeeded:nightly").unwrap());
        assert!(fx.copies.tasks().is_empty());
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let fx = fixture();
        fx.upload("a.uv");
        assert!(matches!(
            fx.copies.launch_copy("a.uv", "undefined-connection", Some("x")),
            Err(OrderError::UnknownConnection(_))
        ));
    }

    #[tokio::test]
    async fn launched_for_is_per_order() {
        let fx = fixture();
        fx.upload("a.uv");
        fx.upload("b.uv");
        fx.copies.launch_copy("a.uv", "nrao", Some("one")).unwrap();
        fx.copies.launch_copy("b.uv", "nrao", Some("two")).unwrap();
        assert_eq!(fx.copies.launched_for("one"), HashSet::from(["a.uv".to_string()]));
        fx.settle().await;
    }
}
