//! Background task runner.
//!
//! Blocking work runs on tokio's blocking pool, at most `n_workers` at a
//! time. The outcome is handed to a wrap-up callback on the control loop,
//! which is the only place the outcome may touch persisted state.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::control::ControlHandle;
use crate::error::{TaskError, TaskResult};

#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    n_workers: usize,
    /// Created on first use.
    pool: OnceLock<Arc<Semaphore>>,
    closed: AtomicBool,
    /// Accepted work whose outcome has not been handed off yet.
    in_flight: AtomicUsize,
    idle: Notify,
    control: ControlHandle,
}

/// Counts one unit of accepted work until dropped.
struct InFlight(Arc<RunnerInner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_one();
        }
    }
}

impl TaskRunner {
    pub fn new(n_workers: usize, control: ControlHandle) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                n_workers: n_workers.max(1),
                pool: OnceLock::new(),
                closed: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                control,
            }),
        }
    }

    pub fn control(&self) -> &ControlHandle {
        &self.inner.control
    }

    /// True once [`shutdown`](Self::shutdown) has started; new work is refused.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn pool(&self) -> Arc<Semaphore> {
        self.inner
            .pool
            .get_or_init(|| {
                debug!(workers = self.inner.n_workers, "worker pool created");
                Arc::new(Semaphore::new(self.inner.n_workers))
            })
            .clone()
    }

    /// Register new work, unless the runner is shutting down.
    fn accept(&self) -> TaskResult<(InFlight, Arc<Semaphore>)> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self.inner.clone());
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TaskError::ShuttingDown);
        }
        Ok((guard, self.pool()))
    }

    /// Run `work` off the control loop; `wrapup` then runs on the control
    /// loop with the outcome. Fails only if the runner is shutting down.
    pub fn launch<T, W, U, Fut>(&self, work: W, wrapup: U) -> TaskResult<()>
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
        U: FnOnce(TaskResult<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (guard, pool) = self.accept()?;
        let control = self.inner.control.clone();
        tokio::spawn(async move {
            let outcome = match pool.acquire_owned().await {
                Ok(_permit) => execute(work).await,
                Err(_) => Err(TaskError::ShuttingDown),
            };
            if control.post(move || wrapup(outcome)).await.is_err() {
                warn!("control loop closed; task outcome dropped");
            }
            drop(guard);
        });
        Ok(())
    }

    /// Run `work` on the pool and wait for its outcome.
    pub async fn run<T, W>(&self, work: W) -> TaskResult<T>
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let (_guard, pool) = self.accept()?;
        let _permit = pool
            .acquire_owned()
            .await
            .map_err(|_| TaskError::ShuttingDown)?;
        execute(work).await
    }

    /// Stop accepting work, then wait until all accepted work has finished
    /// and its wrap-ups are queued on the control loop.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let idle = self.inner.idle.notified();
            let pending = self.inner.in_flight.load(Ordering::SeqCst);
            if pending == 0 {
                break;
            }
            debug!(pending, "waiting for background work");
            idle.await;
        }
        if let Some(pool) = self.inner.pool.get() {
            pool.close();
        }
        info!("worker pool drained");
    }
}

async fn execute<T, W>(work: W) -> TaskResult<T>
where
    T: Send + 'static,
    W: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(join) if join.is_panic() => Err(TaskError::Panicked(panic_message(join.into_panic()))),
        Err(_) => Err(TaskError::ShuttingDown),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
