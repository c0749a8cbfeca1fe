//! librarian.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_PATH_ENV: &str = "LIBRARIAN_CONFIG_PATH";

/// Config file used when neither the flag nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "librarian.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarianConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Size of the background worker pool.
    #[serde(default = "default_worker_threads")]
    pub n_worker_threads: usize,
    /// Capacity of the control loop's callback queue.
    #[serde(default = "default_queue_capacity")]
    pub control_queue_capacity: usize,
    #[serde(default)]
    pub standing_orders: StandingOrderConfig,
    #[serde(default)]
    pub stores: BTreeMap<String, StoreConfig>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub clone_jobs: Vec<CloneJobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path_prefix: String,
    pub ssh_host: Option<String>,
    pub http_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    /// Bytes the store may hold; unlimited when absent.
    pub capacity_bytes: Option<u64>,
    /// Transfer managers usable to move bytes into this store, tried in order.
    #[serde(default = "default_transfer_managers")]
    pub transfer_managers: Vec<String>,
}

/// A named copy destination used by standing orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Name of the store that receives copies.
    pub store: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneJobConfig {
    pub clone_from: String,
    pub clone_to: String,
    pub age_in_days: u32,
    #[serde(default = "default_clone_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingOrderConfig {
    #[serde(default)]
    pub mode: StandingOrderMode,
    /// Minimum spacing between two real evaluations.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    /// Delay between a queued request and its evaluation.
    #[serde(default = "default_delay")]
    pub delay_secs: u64,
    /// Period of the safety-net evaluation request.
    #[serde(default = "default_checkin_interval")]
    pub checkin_interval_secs: u64,
}

impl Default for StandingOrderConfig {
    fn default() -> Self {
        Self {
            mode: StandingOrderMode::default(),
            min_interval_secs: default_min_interval(),
            delay_secs: default_delay(),
            checkin_interval_secs: default_checkin_interval(),
        }
    }
}

impl StandingOrderConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn checkin_interval(&self) -> Duration {
        Duration::from_secs(self.checkin_interval_secs)
    }
}

/// Operating mode of the standing-order manager.
///
/// Unknown strings are kept verbatim so the manager can warn about them;
/// they behave like `normal`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StandingOrderMode {
    #[default]
    Normal,
    Nighttime,
    Disabled,
    Unrecognized(String),
}

impl From<String> for StandingOrderMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "normal" => Self::Normal,
            "nighttime" => Self::Nighttime,
            "disabled" => Self::Disabled,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<StandingOrderMode> for String {
    fn from(mode: StandingOrderMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for StandingOrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Nighttime => f.write_str("nighttime"),
            Self::Disabled => f.write_str("disabled"),
            Self::Unrecognized(other) => f.write_str(other),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/librarian")
}

fn default_worker_threads() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_transfer_managers() -> Vec<String> {
    vec!["local".to_string()]
}

fn default_clone_interval() -> u64 {
    3600
}

fn default_min_interval() -> u64 {
    1200
}

fn default_delay() -> u64 {
    90
}

fn default_checkin_interval() -> u64 {
    600
}

impl LibrarianConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: LibrarianConfig = toml::from_str(content)?;
        if config.n_worker_threads == 0 {
            anyhow::bail!("n_worker_threads must be at least 1");
        }
        if config.control_queue_capacity == 0 {
            anyhow::bail!("control_queue_capacity must be at least 1");
        }
        Ok(config)
    }

    /// Resolve the config path from an explicit flag, then the environment.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Store a connection delivers copies to, if the connection exists.
    pub fn connection_store(&self, conn_name: &str) -> Option<&str> {
        self.connections.get(conn_name).map(|c| c.store.as_str())
    }

    /// Scaffold a two-store configuration with a nightly-style clone job.
    pub fn scaffold(data_dir: &Path) -> Self {
        let store = |prefix: &str| StoreConfig {
            path_prefix: data_dir.join(prefix).display().to_string(),
            ssh_host: None,
            http_prefix: None,
            available: true,
            capacity_bytes: None,
            transfer_managers: default_transfer_managers(),
        };

        let mut stores = BTreeMap::new();
        stores.insert("onsite".to_string(), store("onsite"));
        stores.insert("offsite".to_string(), store("offsite"));

        let mut connections = BTreeMap::new();
        connections.insert(
            "offsite".to_string(),
            ConnectionConfig {
                store: "offsite".to_string(),
            },
        );

        LibrarianConfig {
            data_dir: data_dir.to_path_buf(),
            n_worker_threads: default_worker_threads(),
            control_queue_capacity: default_queue_capacity(),
            standing_orders: StandingOrderConfig::default(),
            stores,
            connections,
            clone_jobs: vec![CloneJobConfig {
                clone_from: "onsite".to_string(),
                clone_to: "offsite".to_string(),
                age_in_days: 1,
                interval_secs: default_clone_interval(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let config = LibrarianConfig::parse("").unwrap();
        assert_eq!(config.n_worker_threads, 8);
        assert_eq!(config.standing_orders.mode, StandingOrderMode::Normal);
        assert_eq!(config.standing_orders.min_interval(), Duration::from_secs(1200));
        assert_eq!(config.standing_orders.delay(), Duration::from_secs(90));
        assert_eq!(config.standing_orders.checkin_interval(), Duration::from_secs(600));
        assert!(config.stores.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
data_dir = "/tmp/lib"
n_worker_threads = 2

[standing_orders]
mode = "nighttime"
delay_secs = 5

[stores.pot]
path_prefix = "/data/pot"
capacity_bytes = 1000
transfer_managers = ["rsync", "local"]

[stores.mirror]
path_prefix = "/data/mirror"
available = false

[connections.nrao]
store = "mirror"

[[clone_jobs]]
clone_from = "pot"
clone_to = "mirror"
age_in_days = 3
"#;
        let config = LibrarianConfig::parse(toml_str).unwrap();
        assert_eq!(config.n_worker_threads, 2);
        assert_eq!(config.standing_orders.mode, StandingOrderMode::Nighttime);
        assert_eq!(config.standing_orders.delay_secs, 5);
        assert_eq!(config.standing_orders.min_interval_secs, 1200);

        let pot = &config.stores["pot"];
        assert_eq!(pot.capacity_bytes, Some(1000));
        assert_eq!(pot.transfer_managers, vec!["rsync", "local"]);
        assert!(pot.available);
        assert!(!config.stores["mirror"].available);
        assert_eq!(config.stores["mirror"].transfer_managers, vec!["local"]);

        assert_eq!(config.connection_store("nrao"), Some("mirror"));
        assert_eq!(config.connection_store("nope"), None);
        assert_eq!(config.clone_jobs[0].age_in_days, 3);
        assert_eq!(config.clone_jobs[0].interval_secs, 3600);
    }

    #[test]
    fn test_unrecognized_mode_is_kept() {
        let config = LibrarianConfig::parse("[standing_orders]\nmode = \"weekends\"\n").unwrap();
        assert_eq!(
            config.standing_orders.mode,
            StandingOrderMode::Unrecognized("weekends".to_string())
        );
        assert_eq!(config.standing_orders.mode.to_string(), "weekends");
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(LibrarianConfig::parse("n_worker_threads = 0").is_err());
    }

    #[test]
    fn test_scaffold() {
        let config = LibrarianConfig::scaffold(Path::new("/srv/librarian"));
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("onsite"));
        assert!(toml_str.contains("mode = \"normal\""));

        let parsed = LibrarianConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.stores.len(), 2);
        assert_eq!(parsed.clone_jobs.len(), 1);
    }

    #[test]
    fn test_resolve_path_prefers_flag() {
        let path = LibrarianConfig::resolve_path(Some(PathBuf::from("/etc/lib.toml")));
        assert_eq!(path, PathBuf::from("/etc/lib.toml"));
    }
}
