//! The control loop.
//!
//! One consumer task drains a bounded queue of callbacks and runs each to
//! completion before starting the next. Everything that mutates persisted
//! state runs as such a callback; other tasks hand work to the loop through a
//! [`ControlHandle`].
//!
//! A callback must not `post(..).await` on its own loop: with a full queue it
//! would wait on itself. Use [`ControlHandle::call_later`] instead, which
//! posts from a separate task.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{TaskError, TaskResult};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type Callback = Box<dyn FnOnce() -> BoxFuture<()> + Send>;

/// What a scheduled job wants after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reschedule {
    /// Stop; the job will not run again.
    Done,
    /// Run again after the given delay.
    After(Duration),
}

pub struct ControlLoop {
    rx: mpsc::Receiver<Callback>,
    handle: ControlHandle,
}

/// Cloneable sender side of the control loop.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Callback>,
}

impl ControlLoop {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            rx,
            handle: ControlHandle { tx },
        }
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Run callbacks until shutdown is signalled, then run whatever is
    /// already queued and stop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let ControlLoop { mut rx, handle } = self;
        // Only external handles keep the loop fed.
        drop(handle);
        info!("control loop started");

        loop {
            tokio::select! {
                callback = rx.recv() => match callback {
                    Some(callback) => callback().await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    info!("control loop shutting down");
                    break;
                }
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Ok(callback) = rx.try_recv() {
            callback().await;
            drained += 1;
        }
        debug!(drained, "control loop stopped");
    }
}

impl ControlHandle {
    /// Queue `f` to run on the control loop, waiting for queue space.
    pub async fn post<F, Fut>(&self, f: F) -> TaskResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback = Box::new(move || Box::pin(f()));
        self.tx
            .send(callback)
            .await
            .map_err(|_| TaskError::ShuttingDown)
    }

    /// Run `f` on the control loop and hand its output back to the caller.
    pub async fn call<F, Fut, T>(&self, f: F) -> TaskResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move || async move {
            let _ = tx.send(f().await);
        })
        .await?;
        rx.await.map_err(|_| TaskError::ShuttingDown)
    }

    /// Queue `f` on the control loop once `delay` has elapsed.
    pub fn call_later<F, Fut>(&self, delay: Duration, f: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if handle.post(f).await.is_err() {
                debug!("control loop closed before delayed callback");
            }
        })
    }

    /// Run `job` on the control loop after `first_delay`, then again after
    /// whatever delay it asks for, until it returns [`Reschedule::Done`] or
    /// the loop shuts down.
    ///
    /// Each future is created off-loop but only polled on the loop, so the
    /// job body always runs there.
    pub fn schedule<F, Fut>(&self, first_delay: Duration, mut job: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Reschedule> + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::time::sleep(delay).await;
                let run = job();
                match handle.call(move || run).await {
                    Ok(Reschedule::After(next)) => delay = next,
                    Ok(Reschedule::Done) => {
                        debug!("scheduled job finished");
                        break;
                    }
                    Err(_) => break,
                }
            }
        })
    }
}
