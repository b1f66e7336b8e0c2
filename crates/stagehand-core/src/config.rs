use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEDULE_KEY: &str = "default";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;
/// Zero keeps the reassignment delay clause inert: a stalled task is eligible
/// for re-issue on the very next update.
pub const DEFAULT_MIN_REASSIGN_DELAY_SECS: u64 = 0;
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 250;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

/// Top-level config (stagehand.toml + STAGEHAND_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagehandConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Where the shared schedule snapshot lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file shared by every worker process.
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Key of the schedule row inside the store. Several independent
    /// schedules can share one database under different keys.
    #[serde(default = "default_key")]
    pub key: String,
    /// How long a worker waits for another worker's transaction to finish.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            key: default_key(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minimum age of a `Started` timestamp before the task may be handed to
    /// another worker.
    #[serde(default = "default_min_reassign_delay_secs")]
    pub min_reassign_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_reassign_delay_secs: DEFAULT_MIN_REASSIGN_DELAY_SECS,
        }
    }
}

/// Worker driver tuning and the program each task runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// First sleep after the coordinator had nothing to hand out.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Upper bound for the doubling idle backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Program executed once per individual task. The task identity is
    /// passed through STAGEHAND_TASK_* environment variables.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Stop after executing this many tasks (unlimited when unset).
    pub max_tasks: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: DEFAULT_IDLE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            command: None,
            args: Vec::new(),
            max_tasks: None,
        }
    }
}

fn default_store_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.stagehand/stagehand.db", home)
}
fn default_key() -> String {
    DEFAULT_SCHEDULE_KEY.to_string()
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_min_reassign_delay_secs() -> u64 {
    DEFAULT_MIN_REASSIGN_DELAY_SECS
}
fn default_idle_backoff_ms() -> u64 {
    DEFAULT_IDLE_BACKOFF_MS
}
fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl StagehandConfig {
    /// Load config from a TOML file with STAGEHAND_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.stagehand/stagehand.toml
    ///
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(%path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STAGEHAND_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.stagehand/stagehand.toml", home)
}
