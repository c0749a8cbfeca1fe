//! Delayed, coalescing evaluation requests for the standing-order manager.
//!
//! Uploads tend to arrive in batches, so a request does not evaluate right
//! away. It schedules one evaluation after the configured delay, and further
//! requests before then are absorbed by it. An evaluation that is skipped by
//! the rate limiter re-arms itself after the same delay instead of being
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use librarian_tasks::{ControlHandle, Reschedule};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::manager::{CheckOutcome, StandingOrderManager};

#[derive(Clone)]
pub struct StandingOrderService {
    manager: Arc<Mutex<StandingOrderManager>>,
    control: ControlHandle,
}

fn lock(manager: &Mutex<StandingOrderManager>) -> MutexGuard<'_, StandingOrderManager> {
    manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Body of one delayed evaluation.
fn run_queued(manager: &Mutex<StandingOrderManager>, delay: Duration) -> Reschedule {
    let mut manager = lock(manager);
    match manager.maybe_launch_copies() {
        CheckOutcome::Ran => {
            manager.launch_queued = false;
            Reschedule::Done
        }
        CheckOutcome::Skipped => {
            debug!(?delay, "standing order check skipped; re-scheduling");
            Reschedule::After(delay)
        }
    }
}

impl StandingOrderService {
    pub fn new(manager: StandingOrderManager, control: ControlHandle) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            control,
        }
    }

    /// Run `f` against the manager. Meant for the control loop.
    pub fn with_manager<T>(&self, f: impl FnOnce(&mut StandingOrderManager) -> T) -> T {
        f(&mut lock(&self.manager))
    }

    /// Ask for an evaluation after the configured delay. A no-op while one
    /// is already pending.
    pub fn queue_launch_copy(&self) {
        let delay = {
            let mut manager = lock(&self.manager);
            if manager.launch_queued {
                debug!("standing order check already queued");
                return;
            }
            manager.launch_queued = true;
            manager.config().delay()
        };
        debug!(?delay, "standing order check queued");
        let manager = self.manager.clone();
        self.control.schedule(delay, move || {
            let manager = manager.clone();
            async move { run_queued(&manager, delay) }
        });
    }

    /// Queue an evaluation every check-in interval, whatever the uploads do.
    pub fn register_checkin(&self) -> JoinHandle<()> {
        let interval = lock(&self.manager).config().checkin_interval();
        let service = self.clone();
        self.control.schedule(interval, move || {
            let service = service.clone();
            async move {
                service.queue_launch_copy();
                Reschedule::After(interval)
            }
        })
    }
}
