use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BshError, Result};

/// Directory name used under the platform config/data/runtime dirs.
pub const APP_DIR: &str = "bsh";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
}

impl Config {
    /// Load defaults, then the config file, then `BSH_*` environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("BSH_CONFIG").ok().map(PathBuf::from));

        let path = match explicit {
            Some(path) => Some(path),
            None => dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml")),
        };
        if let Some(path) = path {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Parse a config document without touching the filesystem or environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config = Self::default();
        let patch: ConfigPatch = toml::from_str(raw)?;
        config.merge_patch(patch);
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| BshError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| BshError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.daemon {
            self.daemon.merge(patch);
        }
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.cache {
            self.cache.merge(patch);
        }
        if let Some(patch) = patch.queue {
            self.queue.merge(patch);
        }
        if let Some(patch) = patch.record {
            self.record.merge(patch);
        }
        if let Some(patch) = patch.suggest {
            self.suggest.merge(patch);
        }
    }

    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BSH_SOCKET") {
            self.daemon.socket_path = Some(PathBuf::from(value));
        }
        if let Some(value) = parse_u64(&lookup, "BSH_READ_TIMEOUT_MS")? {
            self.daemon.read_timeout_ms = value;
        }
        if let Some(value) = lookup("BSH_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = parse_u64(&lookup, "BSH_BRANCH_TTL_MS")? {
            self.cache.branch_ttl_ms = value;
        }
        if let Some(value) = parse_u64(&lookup, "BSH_QUEUE_CAPACITY")? {
            self.queue.capacity = usize::try_from(value)
                .map_err(|err| BshError::Config(format!("invalid BSH_QUEUE_CAPACITY: {err}")))?;
        }
        Ok(())
    }

    /// Per-user data directory holding the database and the daemon log.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("history.db"))
    }

    /// Socket path: explicit setting, else `$XDG_RUNTIME_DIR/bsh.sock`, else the data dir.
    pub fn socket_path(&self) -> PathBuf {
        if let Some(path) = &self.daemon.socket_path {
            return path.clone();
        }
        match dirs::runtime_dir() {
            Some(dir) => dir.join("bsh.sock"),
            None => Self::data_dir().join("bsh.sock"),
        }
    }

    pub fn log_path() -> PathBuf {
        Self::data_dir().join("daemon.log")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default)]
    pub max_message_bytes: usize,
    #[serde(default)]
    pub read_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_message_bytes: 8192,
            read_timeout_ms: 2000,
        }
    }
}

impl DaemonConfig {
    fn merge(&mut self, patch: DaemonPatch) {
        if let Some(value) = patch.socket_path {
            self.socket_path = Some(value);
        }
        if let Some(value) = patch.max_message_bytes {
            self.max_message_bytes = value;
        }
        if let Some(value) = patch.read_timeout_ms {
            self.read_timeout_ms = value;
        }
    }

    /// `None` means reads block until the peer closes.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.db_path {
            self.db_path = Some(value);
        }
        if let Some(value) = patch.busy_timeout_ms {
            self.busy_timeout_ms = value;
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub branch_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            branch_ttl_ms: 2000,
        }
    }
}

impl CacheConfig {
    fn merge(&mut self, patch: CachePatch) {
        if let Some(value) = patch.branch_ttl_ms {
            self.branch_ttl_ms = value;
        }
    }

    pub fn branch_ttl(&self) -> Duration {
        Duration::from_millis(self.branch_ttl_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

impl QueueConfig {
    fn merge(&mut self, patch: QueuePatch) {
        if let Some(value) = patch.capacity {
            self.capacity = value.max(1);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Program names whose invocations are never recorded.
    #[serde(default)]
    pub exclude_programs: Vec<String>,
    #[serde(default)]
    pub ignore_comments: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            exclude_programs: vec!["bsh".to_string(), "bsh-daemon".to_string()],
            ignore_comments: true,
        }
    }
}

impl RecordConfig {
    fn merge(&mut self, patch: RecordPatch) {
        if let Some(values) = patch.exclude_programs {
            self.exclude_programs = values;
        }
        if let Some(value) = patch.ignore_comments {
            self.ignore_comments = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestConfig {
    #[serde(default)]
    pub default_terminal_width: usize,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            default_terminal_width: 80,
        }
    }
}

impl SuggestConfig {
    fn merge(&mut self, patch: SuggestPatch) {
        if let Some(value) = patch.default_terminal_width {
            self.default_terminal_width = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub daemon: Option<DaemonPatch>,
    pub storage: Option<StoragePatch>,
    pub cache: Option<CachePatch>,
    pub queue: Option<QueuePatch>,
    pub record: Option<RecordPatch>,
    pub suggest: Option<SuggestPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DaemonPatch {
    pub socket_path: Option<PathBuf>,
    pub max_message_bytes: Option<usize>,
    pub read_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub db_path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CachePatch {
    pub branch_ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct QueuePatch {
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RecordPatch {
    pub exclude_programs: Option<Vec<String>>,
    pub ignore_comments: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SuggestPatch {
    pub default_terminal_width: Option<usize>,
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| BshError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
