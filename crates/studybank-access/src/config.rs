// crates/studybank-access/src/config.rs
// ============================================================================
// Module: Access Configuration
// Description: Configuration loading and validation for the access service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, studybank-store-sqlite, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every field has a default, so an empty file (or no file) yields a usable
//! configuration. Sections:
//! - `[store]`: backend type, database path, and `SQLite` pragmas.
//! - `[cache]`: TTL, capacity, and eviction batch size.
//! - `[maintenance]`: periodic sweep interval.
//! - `[tuning]`: critical and background statements run at startup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use studybank_store_sqlite::SqliteStoreConfig;
use studybank_store_sqlite::SqliteStoreMode;
use studybank_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of statements in one tuning list.
const MAX_TUNING_STATEMENTS: usize = 64;
/// Maximum cache capacity.
const MAX_CACHE_ENTRIES: usize = 100_000;
/// Minimum maintenance interval in milliseconds.
const MIN_MAINTENANCE_INTERVAL_MS: u64 = 100;
/// Default store name reported by introspection.
const DEFAULT_STORE_NAME: &str = "studybank";
/// Default store schema version reported by introspection.
const DEFAULT_STORE_VERSION: &str = "1.0";
/// Default database file name.
const DEFAULT_STORE_PATH: &str = "studybank.db";
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default cache TTL (ms).
const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1_000;
/// Default cache capacity.
const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;
/// Default number of entries evicted when the cache is full.
const DEFAULT_EVICTION_BATCH: usize = 10;
/// Default maintenance interval (ms).
const DEFAULT_MAINTENANCE_INTERVAL_MS: u64 = 60 * 1_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Top-level access service configuration.
///
/// # Invariants
/// - `validate` has succeeded before the config reaches the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Store name reported by introspection.
    #[serde(default = "default_store_name")]
    pub name: String,
    /// Store schema version reported by introspection.
    #[serde(default = "default_store_version")]
    pub version: String,
    /// Store backend settings.
    #[serde(default)]
    pub store: StoreSection,
    /// Query cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Background maintenance settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Startup tuning statements.
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            version: default_store_version(),
            store: StoreSection::default(),
            cache: CacheConfig::default(),
            maintenance: MaintenanceConfig::default(),
            tuning: TuningConfig::default(),
        }
    }
}

impl AccessConfig {
    /// Builds a default config for a `SQLite` store at `path`.
    #[must_use]
    pub fn for_sqlite_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreSection {
                path: path.into(),
                ..StoreSection::default()
            },
            ..Self::default()
        }
    }

    /// Builds a default config running on the simulated store only.
    #[must_use]
    pub fn simulated() -> Self {
        Self {
            store: StoreSection {
                store_type: StoreType::Simulated,
                ..StoreSection::default()
            },
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path, file, or contents are invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must be non-empty".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("version must be non-empty".to_string()));
        }
        self.store.validate()?;
        self.cache.validate()?;
        self.maintenance.validate()?;
        self.tuning.validate()?;
        Ok(())
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Open the `SQLite` store, falling back to the simulated store.
    #[default]
    Sqlite,
    /// Run on the simulated in-memory store only.
    Simulated,
}

/// Store backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreSection {
    /// Returns the `SQLite` backend configuration for this section.
    #[must_use]
    pub fn sqlite_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Simulated => Ok(()),
            StoreType::Sqlite => validate_store_path(&self.path),
        }
    }
}

/// Query cache configuration.
///
/// # Invariants
/// - `0 < eviction_batch <= max_entries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Entry time-to-live in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    /// Maximum number of cached results.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Entries evicted at once when the cache is full.
    #[serde(default = "default_eviction_batch")]
    pub eviction_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
            max_entries: default_cache_max_entries(),
            eviction_batch: default_eviction_batch(),
        }
    }
}

impl CacheConfig {
    /// Returns the TTL as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Validates cache configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_ms == 0 {
            return Err(ConfigError::Invalid("cache.ttl_ms must be greater than zero".to_string()));
        }
        if self.max_entries == 0 || self.max_entries > MAX_CACHE_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "cache.max_entries must be between 1 and {MAX_CACHE_ENTRIES}"
            )));
        }
        if self.eviction_batch == 0 || self.eviction_batch > self.max_entries {
            return Err(ConfigError::Invalid(
                "cache.eviction_batch must be between 1 and cache.max_entries".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Whether the periodic maintenance loop runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between maintenance ticks in milliseconds.
    #[serde(default = "default_maintenance_interval_ms")]
    pub interval_ms: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_maintenance_interval_ms(),
        }
    }
}

impl MaintenanceConfig {
    /// Returns the tick interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validates maintenance configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms < MIN_MAINTENANCE_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "maintenance.interval_ms must be at least {MIN_MAINTENANCE_INTERVAL_MS}"
            )));
        }
        Ok(())
    }
}

/// Startup tuning statements.
///
/// # Invariants
/// - `critical` runs before initialization completes; `background` runs
///   afterwards and never blocks callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    /// Statements required for correctness.
    #[serde(default = "default_critical_tuning")]
    pub critical: Vec<String>,
    /// Best-effort performance statements.
    #[serde(default = "default_background_tuning")]
    pub background: Vec<String>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            critical: default_critical_tuning(),
            background: default_background_tuning(),
        }
    }
}

impl TuningConfig {
    /// Validates tuning configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_statements("tuning.critical", &self.critical)?;
        validate_statements("tuning.background", &self.background)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default store name.
fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

/// Returns the default store version.
fn default_store_version() -> String {
    DEFAULT_STORE_VERSION.to_string()
}

/// Returns the default database path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default cache TTL.
const fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

/// Returns the default cache capacity.
const fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

/// Returns the default eviction batch size.
const fn default_eviction_batch() -> usize {
    DEFAULT_EVICTION_BATCH
}

/// Returns the default maintenance interval.
const fn default_maintenance_interval_ms() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_MS
}

/// Returns `true` for serde boolean defaults.
const fn default_true() -> bool {
    true
}

/// Returns the default critical tuning statements.
fn default_critical_tuning() -> Vec<String> {
    vec!["PRAGMA foreign_keys = ON".to_string()]
}

/// Returns the default background tuning statements.
fn default_background_tuning() -> Vec<String> {
    vec![
        "PRAGMA cache_size = -8000".to_string(),
        "PRAGMA temp_store = MEMORY".to_string(),
        "PRAGMA optimize".to_string(),
    ]
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the config file path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates the configured store path.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store.path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store.path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store.path path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a tuning statement list.
fn validate_statements(field: &str, statements: &[String]) -> Result<(), ConfigError> {
    if statements.len() > MAX_TUNING_STATEMENTS {
        return Err(ConfigError::Invalid(format!(
            "{field} exceeds {MAX_TUNING_STATEMENTS} statements"
        )));
    }
    if statements.iter().any(|statement| statement.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
    }
    Ok(())
}
