//! CreateClone — replicate recently uploaded instances from one store to
//! another.
//!
//! Each run selects the instances created on the source store within the
//! age window and drives every one that is missing on the destination
//! through stage → transfer → commit, one instance at a time. Every attempt
//! is recorded as a `CloneTransfer`, persisted after each step, and always
//! ends the run as COMPLETED or FAILED.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use librarian_core::CloneJobConfig;
use librarian_state::*;
use librarian_stores::{StoreError, StoreHandle, StoreRegistry, try_transfer_managers};
use librarian_tasks::{ControlHandle, Reschedule, TaskError, TaskRunner};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{CloneError, CloneResult};

/// Counts from one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloneSummary {
    /// Instances inside the age window.
    pub considered: usize,
    pub successful: usize,
    /// Already present on the destination.
    pub unnecessary: usize,
    pub failed: usize,
}

impl CloneSummary {
    pub fn all_successful(&self) -> usize {
        self.successful + self.unnecessary
    }
}

impl fmt::Display for CloneSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.considered;
        write!(
            f,
            "{}/{n} cloned, {}/{n} unnecessary, {}/{n} all successful",
            self.successful,
            self.unnecessary,
            self.all_successful()
        )
    }
}

enum InstanceOutcome {
    Cloned,
    Unnecessary,
}

pub struct CreateClone {
    pub clone_from: String,
    pub clone_to: String,
    pub age_in_days: u32,
    /// Delay between scheduled runs.
    pub interval: Duration,
    state: StateStore,
    stores: Arc<StoreRegistry>,
    runner: TaskRunner,
}

impl CreateClone {
    pub fn new(
        clone_from: &str,
        clone_to: &str,
        age_in_days: u32,
        state: StateStore,
        stores: Arc<StoreRegistry>,
        runner: TaskRunner,
    ) -> Self {
        Self {
            clone_from: clone_from.to_string(),
            clone_to: clone_to.to_string(),
            age_in_days,
            interval: Duration::from_secs(3600),
            state,
            stores,
            runner,
        }
    }

    pub fn from_config(
        job: &CloneJobConfig,
        state: StateStore,
        stores: Arc<StoreRegistry>,
        runner: TaskRunner,
    ) -> Self {
        let mut clone = Self::new(
            &job.clone_from,
            &job.clone_to,
            job.age_in_days,
            state,
            stores,
            runner,
        );
        clone.interval = Duration::from_secs(job.interval_secs);
        clone
    }

    /// One scheduled run. A missing store cancels the job; anything else
    /// keeps it on its interval.
    pub async fn run_scheduled(&self) -> Reschedule {
        match self.on_call().await {
            Ok(_) => Reschedule::After(self.interval),
            Err(CloneError::Configuration(store)) => {
                error!(
                    %store,
                    "store does not exist; cancelling clone job, please update the configuration"
                );
                Reschedule::Done
            }
            Err(e) => {
                error!(from = %self.clone_from, to = %self.clone_to, error = %e, "clone run failed");
                Reschedule::After(self.interval)
            }
        }
    }

    /// Put this job on the control loop, first running one interval from now.
    pub fn schedule(self: Arc<Self>, control: &ControlHandle) -> JoinHandle<()> {
        info!(
            from = %self.clone_from,
            to = %self.clone_to,
            age_in_days = self.age_in_days,
            interval_secs = self.interval.as_secs(),
            "clone job scheduled"
        );
        let first = self.interval;
        control.schedule(first, move || {
            let job = self.clone();
            async move { job.run_scheduled().await }
        })
    }

    fn resolve(&self, name: &str) -> CloneResult<&StoreHandle> {
        if self.state.get_store_by_name(name)?.is_none() {
            return Err(CloneError::Configuration(name.to_string()));
        }
        self.stores
            .get(name)
            .ok_or_else(|| CloneError::Configuration(name.to_string()))
    }

    pub async fn on_call(&self) -> CloneResult<CloneSummary> {
        let from = self.resolve(&self.clone_from)?;
        let to = self.resolve(&self.clone_to)?;

        let mut summary = CloneSummary::default();
        if !from.record.available {
            warn!(store = %from.name(), "source store is unavailable; skipping clone run");
            return Ok(summary);
        }

        let cutoff = epoch_secs().saturating_sub(u64::from(self.age_in_days) * SECONDS_PER_DAY);
        let instances = self
            .state
            .list_instances_on_store_since(from.record.id, cutoff)?;
        summary.considered = instances.len();

        for (done, instance) in instances.iter().enumerate() {
            if self.runner.is_closed() {
                info!(
                    from = %from.name(),
                    to = %to.name(),
                    remaining = instances.len() - done,
                    "shutting down; stopping clone run"
                );
                break;
            }
            match self.clone_instance(from, to, instance).await {
                Ok(InstanceOutcome::Cloned) => summary.successful += 1,
                Ok(InstanceOutcome::Unnecessary) => summary.unnecessary += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        file = %instance.file_name,
                        from = %from.name(),
                        to = %to.name(),
                        error = %e,
                        "clone failed; skipping"
                    );
                }
            }
        }

        info!(
            from = %from.name(),
            to = %to.name(),
            failed = summary.failed,
            "clone run finished: {summary}"
        );
        Ok(summary)
    }

    async fn clone_instance(
        &self,
        from: &StoreHandle,
        to: &StoreHandle,
        instance: &FileInstance,
    ) -> CloneResult<InstanceOutcome> {
        if self
            .state
            .get_instance_on_store(to.record.id, &instance.file_name)?
            .is_some()
        {
            debug!(file = %instance.file_name, store = %to.name(), "already present; skipping");
            return Ok(InstanceOutcome::Unnecessary);
        }

        let file = self
            .state
            .get_file(&instance.file_name)?
            .ok_or_else(|| StateError::NotFound(format!("file {}", instance.file_name)))?;

        let mut transfer = self.state.insert_clone_transfer(CloneTransfer::new_transfer(
            from.record.id,
            to.record.id,
            instance.id,
        ))?;

        match self.drive(&mut transfer, from, to, &file, instance).await {
            Ok(()) => Ok(InstanceOutcome::Cloned),
            Err(e) => {
                if !transfer.status.is_terminal() {
                    transfer.fail()?;
                    self.state.put_clone_transfer(&transfer)?;
                }
                Err(e)
            }
        }
    }

    /// Move one file through the staged-transfer protocol, persisting the
    /// transfer after each step.
    async fn drive(
        &self,
        transfer: &mut CloneTransfer,
        from: &StoreHandle,
        to: &StoreHandle,
        file: &FileRecord,
        instance: &FileInstance,
    ) -> CloneResult<()> {
        let staged = {
            let manager = to.manager.clone();
            let (size, name) = (file.size, file.name.clone());
            self.runner
                .run(move || Ok(manager.stage(size, &name)))
                .await?
        };
        let area = match staged {
            Ok(area) => area,
            Err(StoreError::InsufficientCapacity { needed, available }) => {
                return Err(CloneError::Capacity {
                    file: file.name.clone(),
                    store: to.name().to_string(),
                    needed,
                    available,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let moved = {
            let source = from.manager.clone();
            let managers = to.transfer_managers.clone();
            let store_path = PathBuf::from(&instance.path);
            let destination = area.path.clone();
            self.runner
                .run(move || {
                    Ok(try_transfer_managers(
                        source.as_ref(),
                        &store_path,
                        &destination,
                        &managers,
                    ))
                })
                .await
        };
        let manager_name = match moved {
            Ok(Ok(Some(name))) => name,
            other => {
                self.release(to, &area.id).await;
                let reason = match other {
                    Ok(Ok(_)) => "no transfer manager succeeded".to_string(),
                    Ok(Err(StoreError::NotFound(_))) => {
                        format!("{} does not exist on store {}", instance.path, from.name())
                    }
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => return Err(e.into()),
                };
                return Err(CloneError::Transport {
                    file: file.name.clone(),
                    reason,
                });
            }
        };

        transfer.mark_staged(&manager_name)?;
        self.state.put_clone_transfer(transfer)?;

        let committed = {
            let manager = to.manager.clone();
            let staging_path = area.path.clone();
            let store_path = PathBuf::from(&file.name);
            self.runner
                .run(move || Ok(manager.commit(&staging_path, &store_path)))
                .await
        };
        self.release(to, &area.id).await;
        match committed {
            Ok(Ok(())) => {}
            Ok(Err(StoreError::AlreadyExists(_))) => {
                return Err(CloneError::Conflict {
                    file: file.name.clone(),
                    store: to.name().to_string(),
                });
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(e.into()),
        }

        let new_instance = self.state.insert_instance(FileInstance::new_instance(
            to.record.id,
            &file.name,
            &file.name,
            instance.deletion_policy,
        ))?;
        transfer.complete(new_instance.id)?;
        self.state.put_clone_transfer(transfer)?;
        debug!(
            file = %file.name,
            transfer = transfer.id,
            manager = %manager_name,
            "clone completed"
        );
        Ok(())
    }

    async fn release(&self, store: &StoreHandle, staging_id: &str) {
        let manager = store.manager.clone();
        let id = staging_id.to_string();
        let released = match self.runner.run(move || Ok(manager.unstage(&id))).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            // The pool is closed; release inline so the area does not leak.
            Err(TaskError::ShuttingDown) => {
                store.manager.unstage(staging_id).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = released {
            warn!(store = %store.name(), %staging_id, error = %e, "failed to release staging area");
        }
    }
}
