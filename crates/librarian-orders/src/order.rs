//! Standing orders: persisted (search, connection) rules.
//!
//! An order's search must always compile. Every create and update compiles
//! it before anything is written, so a stored order is never unusable.

use std::collections::HashSet;

use librarian_search::{FileAttr, Predicate, SearchCatalog, SearchCompiler, parse_search};
use librarian_state::{FileRecord, STANDING_ORDER_SUCCEEDED, StandingOrderRecord, StateError, StateStore};
use tracing::{debug, info, warn};

use crate::copy::{CopyLauncher, LaunchOutcome};
use crate::error::{OrderError, OrderResult};

/// Search stored when an order is created without one.
pub const DEFAULT_SEARCH: &str = r#"{
  "name-matches": "any-file-named-like-%-this",
  "not-older-than": 14 # days
}"#;

pub const DEFAULT_CONNECTION: &str = "undefined-connection";

/// File event type marking that `order_name` has delivered a file.
pub fn succeeded_event_type(order_name: &str) -> String {
    format!("{STANDING_ORDER_SUCCEEDED}:{order_name}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandingOrder {
    pub id: u64,
    pub name: String,
    /// JSON search text; `#` starts a comment.
    pub search: String,
    pub conn_name: String,
}

impl From<StandingOrderRecord> for StandingOrder {
    fn from(record: StandingOrderRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            search: record.search,
            conn_name: record.conn_name,
        }
    }
}

impl StandingOrder {
    fn to_record(&self) -> StandingOrderRecord {
        StandingOrderRecord {
            id: self.id,
            name: self.name.clone(),
            search: self.search.clone(),
            conn_name: self.conn_name.clone(),
        }
    }

    /// Reject empty names and searches that do not compile.
    pub fn validate(&self) -> OrderResult<()> {
        if self.name.trim().is_empty() {
            return Err(OrderError::Invalid("name must not be empty".to_string()));
        }
        self.compile()?;
        Ok(())
    }

    pub fn compile(&self) -> OrderResult<Predicate<FileAttr>> {
        self.compile_with(&SearchCompiler::new())
    }

    pub fn compile_with(&self, compiler: &SearchCompiler) -> OrderResult<Predicate<FileAttr>> {
        Ok(compiler.compile_files(&parse_search(&self.search)?)?)
    }

    pub fn event_type(&self) -> String {
        succeeded_event_type(&self.name)
    }

    /// Files matched by the search that still need copying.
    ///
    /// Skips files already carrying this order's success event, and files
    /// whose names are in `launched` (copies already running or done). The
    /// sequence is lazy; call again to start over against fresh state.
    pub fn get_files_to_copy<'a>(
        &self,
        catalog: &'a SearchCatalog,
        state: &'a StateStore,
        launched: HashSet<String>,
    ) -> OrderResult<impl Iterator<Item = OrderResult<&'a FileRecord>> + use<'a>> {
        let predicate = self.compile()?;
        let event_type = self.event_type();
        Ok(catalog
            .files()
            .filter(move |view| predicate.matches(view))
            .filter(move |view| !launched.contains(&view.file.name))
            .filter_map(move |view| match state.has_file_event(&view.file.name, &event_type) {
                Ok(true) => None,
                Ok(false) => Some(Ok(view.file)),
                Err(e) => Some(Err(e.into())),
            }))
    }

    /// Request a copy of every file that needs one. Returns how many copies
    /// were launched.
    pub fn maybe_launch_copies(
        &self,
        catalog: &SearchCatalog,
        state: &StateStore,
        launcher: &dyn CopyLauncher,
    ) -> OrderResult<usize> {
        let launched = launcher.launched_for(&self.name);
        let mut count = 0;
        for file in self.get_files_to_copy(catalog, state, launched)? {
            let file = file?;
            match launcher.launch_copy(&file.name, &self.conn_name, Some(&self.name))? {
                LaunchOutcome::Launched => count += 1,
                LaunchOutcome::NoInstance => warn!(
                    order = %self.name,
                    file = %file.name,
                    "standing order wants a copy, but no instances of the file are available"
                ),
                LaunchOutcome::AlreadyPresent => {}
            }
        }
        if count > 0 {
            info!(order = %self.name, launched = count, conn = %self.conn_name, "standing order launched copies");
        }
        Ok(count)
    }

    // ── Persistence ───────────────────────────────────────────────

    /// Create and persist a new order. Missing search or connection fall
    /// back to [`DEFAULT_SEARCH`] and [`DEFAULT_CONNECTION`].
    pub fn create(
        state: &StateStore,
        name: &str,
        search: Option<&str>,
        conn_name: Option<&str>,
    ) -> OrderResult<Self> {
        let order = Self {
            id: 0,
            name: name.to_string(),
            search: search.unwrap_or(DEFAULT_SEARCH).to_string(),
            conn_name: conn_name.unwrap_or(DEFAULT_CONNECTION).to_string(),
        };
        order.validate()?;
        let record = state
            .insert_standing_order(order.to_record())
            .map_err(|e| already_exists(e, name))?;
        info!(order = %record.name, conn = %record.conn_name, "standing order created");
        Ok(record.into())
    }

    pub fn load(state: &StateStore, name: &str) -> OrderResult<Self> {
        state
            .get_standing_order(name)?
            .map(Self::from)
            .ok_or_else(|| OrderError::NotFound(name.to_string()))
    }

    /// Every order, sorted by name.
    pub fn list(state: &StateStore) -> OrderResult<Vec<Self>> {
        Ok(state
            .list_standing_orders()?
            .into_iter()
            .map(Self::from)
            .collect())
    }

    /// Change any of name, search and connection of the order currently
    /// called `current_name`.
    pub fn update(
        state: &StateStore,
        current_name: &str,
        new_name: Option<&str>,
        search: Option<&str>,
        conn_name: Option<&str>,
    ) -> OrderResult<Self> {
        let mut order = Self::load(state, current_name)?;
        if let Some(name) = new_name {
            order.name = name.to_string();
        }
        if let Some(search) = search {
            order.search = search.to_string();
        }
        if let Some(conn) = conn_name {
            order.conn_name = conn.to_string();
        }
        order.validate()?;
        state
            .replace_standing_order(current_name, &order.to_record())
            .map_err(|e| match e {
                StateError::NotFound(_) => OrderError::NotFound(current_name.to_string()),
                other => already_exists(other, &order.name),
            })?;
        debug!(from = %current_name, to = %order.name, "standing order updated");
        Ok(order)
    }

    pub fn delete(state: &StateStore, name: &str) -> OrderResult<()> {
        if !state.delete_standing_order(name)? {
            return Err(OrderError::NotFound(name.to_string()));
        }
        info!(order = %name, "standing order deleted");
        Ok(())
    }
}

fn already_exists(e: StateError, name: &str) -> OrderError {
    match e {
        StateError::Conflict(_) => OrderError::AlreadyExists(name.to_string()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use librarian_state::{DeletionPolicy, FileInstance, StoreRecord, epoch_secs};
    use std::sync::Mutex;

    fn test_file(name: &str) -> FileRecord {
        FileRecord {
            name: name.to_string(),
            file_type: "uv".to_string(),
            source: "correlator".to_string(),
            size: 100,
            obsid: None,
            created_at: epoch_secs(),
        }
    }

    /// Launcher that records requests without running anything.
    #[derive(Default)]
    struct RecordingLauncher {
        requests: Mutex<Vec<(String, String)>>,
        in_flight: HashSet<String>,
        no_instance: bool,
    }

    impl CopyLauncher for RecordingLauncher {
        fn launch_copy(
            &self,
            file_name: &str,
            conn_name: &str,
            _standing_order_name: Option<&str>,
        ) -> OrderResult<LaunchOutcome> {
            if self.no_instance {
                return Ok(LaunchOutcome::NoInstance);
            }
            self.requests
                .lock()
                .unwrap()
                .push((file_name.to_string(), conn_name.to_string()));
            Ok(LaunchOutcome::Launched)
        }

        fn launched_for(&self, _standing_order_name: &str) -> HashSet<String> {
            self.in_flight.clone()
        }
    }

    fn test_state_with_files(names: &[&str]) -> StateStore {
        let state = StateStore::open_in_memory().unwrap();
        let store = state
            .ensure_store(StoreRecord {
                id: 0,
                name: "onsite".to_string(),
                path_prefix: "/data".to_string(),
                ssh_host: None,
                http_prefix: None,
                available: true,
            })
            .unwrap();
        for name in names {
            state.insert_file(&test_file(name)).unwrap();
            state
                .insert_instance(FileInstance::new_instance(store.id, name, name, DeletionPolicy::Allowed))
                .unwrap();
        }
        state
    }

    #[test]
    fn create_uses_defaults() {
        let state = StateStore::open_in_memory().unwrap();
        let order = StandingOrder::create(&state, "nightly", None, None).unwrap();
        assert_eq!(order.search, DEFAULT_SEARCH);
        assert_eq!(order.conn_name, DEFAULT_CONNECTION);
        assert_eq!(StandingOrder::load(&state, "nightly").unwrap(), order);
    }

    #[test]
    fn invalid_orders_are_never_persisted() {
        let state = StateStore::open_in_memory().unwrap();
        let err = StandingOrder::create(&state, "bad", Some(r#"{"size-greater-than": "big"}"#), None)
            .unwrap_err();
        assert!(matches!(err, OrderError::Parse(_)));
        assert!(matches!(
            StandingOrder::create(&state, "  ", None, None),
            Err(OrderError::Invalid(_))
        ));
        assert!(StandingOrder::list(&state).unwrap().is_empty());

        StandingOrder::create(&state, "good", None, None).unwrap();
        let err = StandingOrder::update(&state, "good", None, Some("[1, 2]"), None).unwrap_err();
        assert!(matches!(err, OrderError::Parse(_)));
        assert_eq!(StandingOrder::load(&state, "good").unwrap().search, DEFAULT_SEARCH);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let state = StateStore::open_in_memory().unwrap();
        StandingOrder::create(&state, "a", None, None).unwrap();
        StandingOrder::create(&state, "b", None, None).unwrap();
        assert!(matches!(
            StandingOrder::create(&state, "a", None, None),
            Err(OrderError::AlreadyExists(name)) if name == "a"
        ));
        assert!(matches!(
            StandingOrder::update(&state, "b", Some("a"), None, None),
            Err(OrderError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_rename_and_delete() {
        let state = StateStore::open_in_memory().unwrap();
        StandingOrder::create(&state, "zeta", None, None).unwrap();
        StandingOrder::create(&state, "alpha", None, Some("nrao")).unwrap();

        let renamed = StandingOrder::update(&state, "zeta", Some("beta"), None, Some("aoc")).unwrap();
        assert_eq!(renamed.conn_name, "aoc");
        let names: Vec<String> = StandingOrder::list(&state)
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        StandingOrder::delete(&state, "beta").unwrap();
        assert!(matches!(StandingOrder::delete(&state, "beta"), Err(OrderError::NotFound(_))));
        assert!(matches!(
            StandingOrder::update(&state, "beta", None, None, None),
            Err(OrderError::NotFound(_))
        ));
    }

    #[test]
    fn files_to_copy_skips_delivered_and_launched() {
        let state = test_state_with_files(&["zen.1.uv", "zen.2.uv", "zen.3.uv", "other.txt"]);
        let order = StandingOrder::create(&state, "zen", Some(r#"{"name-matches": "zen.%.uv"}"#), Some("nrao"))
            .unwrap();
        state.record_file_event("zen.1.uv", &order.event_type()).unwrap();
        state
            .record_file_event("zen.2.uv", &succeeded_event_type("another-order"))
            .unwrap();

        let catalog = SearchCatalog::load(&state).unwrap();
        let launched = HashSet::from(["zen.3.uv".to_string()]);
        let names: Vec<&str> = order
            .get_files_to_copy(&catalog, &state, launched)
            .unwrap()
            .map(|f| f.unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["zen.2.uv"]);

        // Restartable: a fresh call sees the same state.
        let again = order.get_files_to_copy(&catalog, &state, HashSet::new()).unwrap().count();
        assert_eq!(again, 2);
    }

    #[test]
    fn launches_copies_to_the_order_connection() {
        let state = test_state_with_files(&["zen.1.uv", "zen.2.uv"]);
        let order = StandingOrder::create(&state, "zen", Some("{\"name-matches\": \"zen.%\"} # all"), Some("nrao"))
            .unwrap();
        let catalog = SearchCatalog::load(&state).unwrap();
        let launcher = RecordingLauncher {
            in_flight: HashSet::from(["zen.2.uv".to_string()]),
            ..Default::default()
        };
        assert_eq!(order.maybe_launch_copies(&catalog, &state, &launcher).unwrap(), 1);
        assert_eq!(
            *launcher.requests.lock().unwrap(),
            vec![("zen.1.uv".to_string(), "nrao".to_string())]
        );
    }

    #[test]
    fn missing_instances_are_not_errors() {
        let state = test_state_with_files(&["zen.1.uv"]);
        let order = StandingOrder::create(&state, "zen", Some(r#"{"name-matches": "zen.%"}"#), None).unwrap();
        let catalog = SearchCatalog::load(&state).unwrap();
        let launcher = RecordingLauncher {
            no_instance: true,
            ..Default::default()
        };
        assert_eq!(order.maybe_launch_copies(&catalog, &state, &launcher).unwrap(), 0);
    }
}
