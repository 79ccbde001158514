// crates/studybank-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store Backend
// Description: StoreBackend implementation backed by a single SQLite file.
// Purpose: Execute statements and transactional batches on the real engine.
// Dependencies: rusqlite, serde, studybank-core, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteBackend`] owns one `SQLite` connection guarded by a mutex. Opening
//! validates the store path, creates the parent directory, and applies the
//! journal, sync, and busy-timeout settings from [`SqliteStoreConfig`].
//! Statements returning columns are read into rows; everything else reports
//! the engine's change count and, for inserts, the last row id. Batches run
//! inside one transaction and roll back on the first failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Deserialize;
use serde::Serialize;
use studybank_core::BackendError;
use studybank_core::BackendKind;
use studybank_core::BatchStatement;
use studybank_core::QueryResult;
use studybank_core::Row;
use studybank_core::SqlValue;
use studybank_core::StatementKind;
use studybank_core::StoreBackend;
use thiserror::Error;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Suffixes of the files `SQLite` keeps next to the database.
const ARTIFACT_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    Full,
    /// Normal synchronous mode (balanced).
    #[default]
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store backend.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config with defaults for everything but the path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors raised while opening the backend.
///
/// # Invariants
/// - Error messages avoid embedding statement parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid config: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for BackendError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::Invalid(message) => {
                Self::Unavailable(message)
            }
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// `SQLite`-backed store backend.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - The connection slot is `None` once the backend is closed.
pub struct SqliteBackend {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Open connection, taken on close.
    connection: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Opens the `SQLite` store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid or the database
    /// cannot be opened and configured.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(&config)?;
        info!(
            path = %config.path.display(),
            journal_mode = config.journal_mode.pragma_value(),
            sync_mode = config.sync_mode.pragma_value(),
            "sqlite store opened"
        );
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the connection slot, recovering from poisoning.
    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, BackendError> {
        let guard = self.lock_connection();
        let connection = guard.as_ref().ok_or(BackendError::Closed)?;
        run_statement(connection, statement, params).map_err(|err| engine_error(&err))
    }

    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), BackendError> {
        let mut guard = self.lock_connection();
        let connection = guard.as_mut().ok_or(BackendError::Closed)?;
        let tx = connection.transaction().map_err(|err| engine_error(&err))?;
        for (index, statement) in statements.iter().enumerate() {
            if let Err(err) = run_statement(&tx, &statement.text, &statement.params) {
                debug!(index, "sqlite batch statement failed; rolling back");
                return Err(BackendError::Batch {
                    index,
                    source: Box::new(engine_error(&err)),
                });
            }
        }
        tx.commit().map_err(|err| engine_error(&err))
    }

    fn close(&self) -> Result<(), BackendError> {
        let Some(connection) = self.lock_connection().take() else {
            return Ok(());
        };
        connection.close().map_err(|(_, err)| engine_error(&err))?;
        info!(path = %self.config.path.display(), "sqlite store closed");
        Ok(())
    }

    fn size_bytes(&self) -> u64 {
        artifact_paths(&self.config.path)
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|metadata| metadata.len())
            .sum()
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.config.path.clone())
    }

    fn remove_artifacts(&self) -> Result<Vec<PathBuf>, BackendError> {
        let mut removed = Vec::new();
        for path in artifact_paths(&self.config.path) {
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(BackendError::Io(format!(
                        "failed to remove {}: {err}",
                        path.display()
                    )));
                }
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// SECTION: Statement Execution
// ============================================================================

/// Runs one statement, reading rows when the statement yields columns.
fn run_statement(
    connection: &Connection,
    statement: &str,
    params: &[SqlValue],
) -> rusqlite::Result<QueryResult> {
    let mut prepared = connection.prepare(statement)?;
    let bound = params_from_iter(params.iter().map(to_engine_value));
    if prepared.column_count() > 0 {
        let columns: Vec<String> =
            prepared.column_names().into_iter().map(str::to_string).collect();
        let mut rows = prepared.query(bound)?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::new();
            for (index, column) in columns.iter().enumerate() {
                let value: Value = row.get(index)?;
                values.insert(column.clone(), from_engine_value(value));
            }
            collected.push(values);
        }
        return Ok(QueryResult::from_rows(collected));
    }
    let changed = prepared.execute(bound)?;
    let rows_affected = u64::try_from(changed).unwrap_or(u64::MAX);
    let is_insert = matches!(StatementKind::classify(statement), StatementKind::Insert(_));
    let insert_id = (changed > 0 && is_insert).then(|| connection.last_insert_rowid());
    Ok(QueryResult::affected(rows_affected, insert_id))
}

/// Converts a core value into an engine value.
fn to_engine_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
        SqlValue::Blob(value) => Value::Blob(value.clone()),
    }
}

/// Converts an engine value into a core value.
fn from_engine_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(value) => SqlValue::Integer(value),
        Value::Real(value) => SqlValue::Real(value),
        Value::Text(value) => SqlValue::Text(value),
        Value::Blob(value) => SqlValue::Blob(value),
    }
}

/// Maps a `rusqlite` error into a backend error carrying the engine code.
fn engine_error(error: &rusqlite::Error) -> BackendError {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => BackendError::Engine {
            code: error_code_label(failure.code).to_string(),
            message: error.to_string(),
        },
        _ => BackendError::Statement(error.to_string()),
    }
}

/// Returns the `SQLite` primary result code name.
const fn error_code_label(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::ConstraintViolation => "SQLITE_CONSTRAINT",
        ErrorCode::DatabaseBusy => "SQLITE_BUSY",
        ErrorCode::DatabaseLocked => "SQLITE_LOCKED",
        ErrorCode::ReadOnly => "SQLITE_READONLY",
        ErrorCode::CannotOpen => "SQLITE_CANTOPEN",
        ErrorCode::DatabaseCorrupt => "SQLITE_CORRUPT",
        ErrorCode::NotADatabase => "SQLITE_NOTADB",
        ErrorCode::DiskFull => "SQLITE_FULL",
        ErrorCode::SystemIoFailure => "SQLITE_IOERR",
        ErrorCode::TypeMismatch => "SQLITE_MISMATCH",
        ErrorCode::ApiMisuse => "SQLITE_MISUSE",
        ErrorCode::PermissionDenied => "SQLITE_PERM",
        ErrorCode::TooBig => "SQLITE_TOOBIG",
        _ => "SQLITE_ERROR",
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the database file plus the sidecar files `SQLite` may create.
#[must_use]
pub fn artifact_paths(path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![path.to_path_buf()];
    for suffix in ARTIFACT_SUFFIXES {
        let mut sidecar = path.as_os_str().to_os_string();
        sidecar.push(suffix);
        paths.push(PathBuf::from(sidecar));
    }
    paths
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies journal, sync, and busy-timeout settings.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rusqlite::ErrorCode;

    use super::artifact_paths;
    use super::error_code_label;

    #[test]
    fn artifact_paths_include_sidecars() {
        let paths = artifact_paths(Path::new("/tmp/studybank.db"));
        let names: Vec<String> = paths.iter().map(|path| path.display().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "/tmp/studybank.db",
                "/tmp/studybank.db-wal",
                "/tmp/studybank.db-shm",
                "/tmp/studybank.db-journal",
            ]
        );
    }

    #[test]
    fn error_codes_use_sqlite_names() {
        assert_eq!(error_code_label(ErrorCode::ConstraintViolation), "SQLITE_CONSTRAINT");
        assert_eq!(error_code_label(ErrorCode::DatabaseBusy), "SQLITE_BUSY");
    }
}
