//! Rate-limited evaluation of every standing order.

use std::sync::Arc;

use chrono::{DateTime, Local, Timelike};
use librarian_core::{StandingOrderConfig, StandingOrderMode};
use librarian_search::SearchCatalog;
use librarian_state::StateStore;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::copy::CopyLauncher;
use crate::order::StandingOrder;

/// Local wall-clock source, consulted for `nighttime` mode.
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Local hours during which `nighttime` mode holds evaluations back.
const DAYTIME_HOURS: std::ops::Range<u32> = 8..20;

/// Whether an evaluation request was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Handled, including when the mode said to do nothing.
    Ran,
    /// Too soon after the previous evaluation; nothing was looked at.
    Skipped,
}

pub struct StandingOrderManager {
    state: StateStore,
    launcher: Arc<dyn CopyLauncher>,
    config: StandingOrderConfig,
    clock: Clock,
    last_check: Option<Instant>,
    pub(crate) launch_queued: bool,
    evaluations: u64,
}

impl StandingOrderManager {
    pub fn new(state: StateStore, launcher: Arc<dyn CopyLauncher>, config: StandingOrderConfig) -> Self {
        Self {
            state,
            launcher,
            config,
            clock: Arc::new(Local::now),
            last_check: None,
            launch_queued: false,
            evaluations: 0,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StandingOrderConfig {
        &self.config
    }

    /// Number of times the orders were actually evaluated.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn launch_queued(&self) -> bool {
        self.launch_queued
    }

    /// Evaluate every standing order unless one was evaluated less than the
    /// minimum interval ago.
    pub fn maybe_launch_copies(&mut self) -> CheckOutcome {
        let now = Instant::now();
        let min_interval = self.config.min_interval();
        if self
            .last_check
            .is_some_and(|last| now.duration_since(last) < min_interval)
        {
            debug!(?min_interval, "not checking standing orders: checked too recently");
            return CheckOutcome::Skipped;
        }

        match &self.config.mode {
            StandingOrderMode::Disabled => {
                debug!("not checking standing orders: explicitly disabled");
                return CheckOutcome::Ran;
            }
            StandingOrderMode::Nighttime => {
                let hour = (self.clock)().hour();
                if DAYTIME_HOURS.contains(&hour) {
                    debug!(hour, "not checking standing orders: \"nighttime\" mode");
                    return CheckOutcome::Ran;
                }
            }
            StandingOrderMode::Unrecognized(mode) => {
                warn!(%mode, "unrecognized standing order mode; treating as \"normal\"");
            }
            StandingOrderMode::Normal => {}
        }

        debug!("running standing order searches");
        self.last_check = Some(now);
        self.evaluations += 1;
        self.launcher.prune_finished();
        self.evaluate_all();
        CheckOutcome::Ran
    }

    /// One order failing does not stop the others.
    fn evaluate_all(&self) {
        let orders = match StandingOrder::list(&self.state) {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "failed to load standing orders");
                return;
            }
        };
        if orders.is_empty() {
            return;
        }
        let catalog = match SearchCatalog::load(&self.state) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(error = %e, "failed to snapshot the catalog");
                return;
            }
        };
        for order in &orders {
            if let Err(e) = order.maybe_launch_copies(&catalog, &self.state, self.launcher.as_ref()) {
                error!(order = %order.name, error = %e, "standing order evaluation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::LaunchOutcome;
    use crate::error::OrderResult;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLauncher {
        prunes: AtomicUsize,
    }

    impl CopyLauncher for CountingLauncher {
        fn launch_copy(&self, _: &str, _: &str, _: Option<&str>) -> OrderResult<LaunchOutcome> {
            Ok(LaunchOutcome::NoInstance)
        }

        fn launched_for(&self, _: &str) -> HashSet<String> {
            HashSet::new()
        }

        fn prune_finished(&self) {
            self.prunes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_manager(mode: StandingOrderMode) -> (StandingOrderManager, Arc<CountingLauncher>) {
        let state = StateStore::open_in_memory().unwrap();
        let launcher = Arc::new(CountingLauncher::default());
        let config = StandingOrderConfig {
            mode,
            ..StandingOrderConfig::default()
        };
        let manager = StandingOrderManager::new(state, launcher.clone(), config);
        (manager, launcher)
    }

    fn at_hour(hour: u32) -> Clock {
        Arc::new(move || Local.with_ymd_and_hms(2026, 1, 15, hour, 30, 0).single().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn evaluations_are_rate_limited() {
        let (mut manager, launcher) = test_manager(StandingOrderMode::Normal);
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Skipped);
        assert_eq!(manager.evaluations(), 1);

        tokio::time::advance(Duration::from_secs(1200)).await;
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.evaluations(), 2);
        assert_eq!(launcher.prunes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_mode_reports_ran_without_evaluating() {
        let (mut manager, launcher) = test_manager(StandingOrderMode::Disabled);
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.evaluations(), 0);
        assert_eq!(launcher.prunes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nighttime_mode_follows_local_hour() {
        let (manager, _) = test_manager(StandingOrderMode::Nighttime);
        let mut manager = manager.with_clock(at_hour(12));
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.evaluations(), 0);

        let (manager, _) = test_manager(StandingOrderMode::Nighttime);
        let mut manager = manager.with_clock(at_hour(23));
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.evaluations(), 1);

        let (manager, _) = test_manager(StandingOrderMode::Nighttime);
        let mut manager = manager.with_clock(at_hour(20));
        manager.maybe_launch_copies();
        assert_eq!(manager.evaluations(), 1);
    }

    #[tokio::test]
    async fn unrecognized_mode_runs_as_normal() {
        let (mut manager, _) = test_manager(StandingOrderMode::Unrecognized("weekends".to_string()));
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.evaluations(), 1);
    }

    #[tokio::test]
    async fn evaluates_with_stored_orders() {
        let (mut manager, _) = test_manager(StandingOrderMode::Normal);
        StandingOrder::create(&manager.state, "a", None, Some("nowhere")).unwrap();
        StandingOrder::create(&manager.state, "b", None, None).unwrap();
        assert_eq!(manager.maybe_launch_copies(), CheckOutcome::Ran);
        assert_eq!(manager.evaluations(), 1);
    }
}
