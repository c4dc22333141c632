//! Configuration loading for member-sync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/member-sync/config.toml.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MemberError;

/// Synchronization tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Pending ids claimed per full-resync batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries after the first not-found in incremental sync.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between incremental sync retries.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound for STRING and SPECIAL attribute values, in UTF-8 bytes.
    #[serde(default = "default_max_string_bytes")]
    pub max_string_bytes: usize,
}

fn default_batch_size() -> usize {
    200
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_max_string_bytes() -> usize {
    25_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_string_bytes: default_max_string_bytes(),
        }
    }
}

/// Orphan cleanup and pending-queue drain scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Whether the daemon schedules orphan cleanup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether the daemon schedules pending queue drains.
    #[serde(default = "default_true")]
    pub pending_enabled: bool,

    /// Cron expression for cleanup (6-field, default: 03:00 daily).
    #[serde(default = "default_cleanup_cron")]
    pub cron: String,

    /// Cron expression for draining pending queues without reset.
    #[serde(default = "default_pending_cron")]
    pub pending_cron: String,

    /// IANA timezone for both schedules.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Max random delay before a scheduled run.
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,

    /// Index hits fetched per cleanup page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Tenants the daemon maintains.
    #[serde(default)]
    pub tenants: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_cleanup_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_pending_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_jitter_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    500
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            pending_enabled: default_true(),
            cron: default_cleanup_cron(),
            pending_cron: default_pending_cron(),
            timezone: default_timezone(),
            jitter_secs: default_jitter_secs(),
            page_size: default_page_size(),
            tenants: Vec::new(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB member store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to the member search index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Logical name of the member index
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub cleanup: CleanupSettings,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "member-sync")
}

fn default_db_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_index_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("member-index"))
        .unwrap_or_else(|| PathBuf::from("./member-index"))
        .to_string_lossy()
        .to_string()
}

fn default_index_name() -> String {
    "members".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_path: default_index_path(),
            index_name: default_index_name(),
            log_level: default_log_level(),
            sync: SyncSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/member-sync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (MEMBER_SYNC_*, `__` between nested keys)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MemberError> {
        let config_dir = project_dirs()
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| MemberError::Config(e.to_string()))?
            .set_default("index_path", default_index_path())
            .map_err(|e| MemberError::Config(e.to_string()))?
            .set_default("index_name", default_index_name())
            .map_err(|e| MemberError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| MemberError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // e.g. MEMBER_SYNC_DB_PATH, MEMBER_SYNC_SYNC__BATCH_SIZE, MEMBER_SYNC_CLEANUP__TENANTS=a,b
        builder = builder.add_source(
            Environment::with_prefix("MEMBER_SYNC")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cleanup.tenants")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MemberError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemberError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), MemberError> {
        if self.sync.batch_size == 0 {
            return Err(MemberError::Config("sync.batch_size must be > 0".to_string()));
        }
        if self.sync.max_string_bytes == 0 {
            return Err(MemberError::Config(
                "sync.max_string_bytes must be > 0".to_string(),
            ));
        }
        if self.cleanup.page_size == 0 {
            return Err(MemberError::Config(
                "cleanup.page_size must be > 0".to_string(),
            ));
        }
        if self.index_name.trim().is_empty() {
            return Err(MemberError::Config("index_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        expand_home(&self.index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
