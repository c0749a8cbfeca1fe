//! `librariand serve`: wire the engine together and run until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use librarian_clone::CreateClone;
use librarian_core::LibrarianConfig;
use librarian_orders::{CopyTaskManager, StandingOrderManager, StandingOrderService};
use librarian_state::StateStore;
use librarian_stores::StoreRegistry;
use librarian_tasks::{ControlLoop, TaskRunner};
use tokio::sync::watch;
use tracing::info;

/// State database file name inside `data_dir`.
pub const STATE_FILE: &str = "librarian.redb";

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = LibrarianConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    info!(config = %config_path.display(), "librarian daemon starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join(STATE_FILE);

    // ── Initialize subsystems ──────────────────────────────────

    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let stores = Arc::new(StoreRegistry::bootstrap(&config, &state)?);

    let control = ControlLoop::new(config.control_queue_capacity);
    let handle = control.handle();
    let runner = TaskRunner::new(config.n_worker_threads, handle.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control_task = tokio::spawn(control.run(shutdown_rx));

    // ── Recurring work ─────────────────────────────────────────

    let mut jobs = Vec::new();
    for job in &config.clone_jobs {
        let clone = CreateClone::from_config(job, state.clone(), stores.clone(), runner.clone());
        jobs.push(Arc::new(clone).schedule(&handle));
    }

    let copies = CopyTaskManager::from_config(&config, state.clone(), stores.clone(), runner.clone());
    let manager = StandingOrderManager::new(state.clone(), Arc::new(copies), config.standing_orders.clone());
    let orders = StandingOrderService::new(manager, handle.clone());
    jobs.push(orders.register_checkin());
    orders.queue_launch_copy();
    info!(
        clone_jobs = config.clone_jobs.len(),
        mode = %config.standing_orders.mode,
        workers = config.n_worker_threads,
        "librarian daemon ready"
    );

    // ── Shutdown ───────────────────────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    for job in &jobs {
        job.abort();
    }
    // Background work finishes and queues its wrap-ups; the loop then runs
    // them before it stops.
    runner.shutdown().await;
    let _ = shutdown_tx.send(true);
    control_task.await?;

    info!("librarian daemon stopped");
    Ok(())
}
