// crates/studybank-access/tests/access_service_unit.rs
// ============================================================================
// Module: Access Service Unit Tests
// Description: Lifecycle, caching, and deduplication tests for the service.
// Purpose: Validate single-flight initialization, fallback, read-through
//          caching, in-flight deduplication, and reset semantics.
// ============================================================================

//! ## Overview
//! Drives [`AccessService`] through a counting backend provider:
//! - Concurrent first use opens the backend once
//! - Fallback and total-failure initialization paths
//! - Read-through caching, write bypass, and bounded staleness
//! - Concurrent identical reads share one backend call
//! - Tuning failures never fail initialization or stop later steps
//! - Reset and close return the service to `Uninitialized`

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use studybank_access::AccessConfig;
use studybank_access::AccessService;
use studybank_access::BackendProvider;
use studybank_access::BackendSelection;
use studybank_access::CacheConfig;
use studybank_access::CacheMode;
use studybank_access::ConfigError;
use studybank_access::MaintenanceConfig;
use studybank_access::ServiceState;
use studybank_access::TuningConfig;
use studybank_core::BackendError;
use studybank_core::BackendKind;
use studybank_core::BatchStatement;
use studybank_core::QueryResult;
use studybank_core::Severity;
use studybank_core::SimulatedStore;
use studybank_core::SqlValue;
use studybank_core::StoreBackend;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Statement used by the read tests.
const SELECT_QUESTIONS: &str = "SELECT * FROM questions";
/// Count statement used by the staleness tests.
const COUNT_QUESTIONS: &str = "SELECT COUNT(*) AS count FROM questions";
/// Insert statement used by the write tests.
const INSERT_QUESTION: &str = "INSERT INTO questions (id) VALUES (?)";

/// Simulated backend that counts and optionally delays executions.
struct CountingBackend {
    /// Wrapped store.
    inner: SimulatedStore,
    /// Executions per statement text.
    executions: Mutex<HashMap<String, usize>>,
    /// Delay applied to every execution.
    delay: Duration,
}

impl CountingBackend {
    fn new(delay: Duration) -> Self {
        Self {
            inner: SimulatedStore::new(),
            executions: Mutex::new(HashMap::new()),
            delay,
        }
    }

    fn executions_of(&self, statement: &str) -> usize {
        self.executions.lock().unwrap().get(statement).copied().unwrap_or(0)
    }
}

impl StoreBackend for CountingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulated
    }

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, BackendError> {
        *self.executions.lock().unwrap().entry(statement.to_string()).or_default() += 1;
        thread::sleep(self.delay);
        self.inner.execute(statement, params)
    }

    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), BackendError> {
        self.inner.execute_batch(statements)
    }

    fn close(&self) -> Result<(), BackendError> {
        self.inner.close()
    }
}

/// Provider handing out one shared counting backend.
struct CountingProvider {
    /// Backend returned by `open_primary`.
    backend: Arc<CountingBackend>,
    /// Primary open attempts.
    opens: AtomicUsize,
    /// Delay applied to every open.
    open_delay: Duration,
    /// Whether the primary open fails.
    fail_primary: bool,
    /// Whether the fallback open fails.
    fail_fallback: bool,
}

impl CountingProvider {
    fn new(open_delay: Duration, execute_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(CountingBackend::new(execute_delay)),
            opens: AtomicUsize::new(0),
            open_delay,
            fail_primary: false,
            fail_fallback: false,
        })
    }

    fn failing(fail_fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(CountingBackend::new(Duration::ZERO)),
            opens: AtomicUsize::new(0),
            open_delay: Duration::ZERO,
            fail_primary: true,
            fail_fallback,
        })
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl BackendProvider for CountingProvider {
    fn open_primary(&self) -> Result<Arc<dyn StoreBackend>, BackendError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.open_delay);
        if self.fail_primary {
            return Err(BackendError::Unavailable("primary disabled".to_string()));
        }
        Ok(Arc::clone(&self.backend) as Arc<dyn StoreBackend>)
    }

    fn open_fallback(&self) -> Result<Arc<dyn StoreBackend>, BackendError> {
        if self.fail_fallback {
            return Err(BackendError::Unavailable("fallback disabled".to_string()));
        }
        Ok(Arc::new(SimulatedStore::new()))
    }
}

fn test_config() -> AccessConfig {
    AccessConfig {
        maintenance: MaintenanceConfig {
            enabled: false,
            ..MaintenanceConfig::default()
        },
        tuning: TuningConfig {
            critical: Vec::new(),
            background: Vec::new(),
        },
        ..AccessConfig::simulated()
    }
}

fn count_of(result: &QueryResult) -> Option<i64> {
    result.first_value("count").and_then(SqlValue::as_integer)
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_opens_backend_once() {
    let provider = CountingProvider::new(Duration::from_millis(50), Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    assert_eq!(service.state(), ServiceState::Uninitialized);

    let mut tasks = Vec::new();
    for _ in 0 .. 16 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move { service.ensure_initialized().await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(provider.opens(), 1);
    assert_eq!(service.state(), ServiceState::Initialized);
    assert!(service.is_connected());
}

#[tokio::test]
async fn first_query_initializes_implicitly() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(provider.opens(), 1);
    assert_eq!(service.config().selection, Some(BackendSelection::Opened));
}

#[tokio::test]
async fn unavailable_sqlite_store_falls_back_to_simulated() {
    let temp = TempDir::new().unwrap();
    let config = AccessConfig {
        maintenance: MaintenanceConfig {
            enabled: false,
            ..MaintenanceConfig::default()
        },
        ..AccessConfig::for_sqlite_path(temp.path())
    };
    let service = AccessService::new(config).unwrap();
    service.ensure_initialized().await.unwrap();
    assert!(service.is_connected());

    let descriptor = service.config();
    assert_eq!(descriptor.backend, Some(BackendKind::Simulated));
    assert!(matches!(descriptor.selection, Some(BackendSelection::Fallback { .. })));
    assert_eq!(descriptor.path, None);

    let inserted = service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();
    assert_eq!(inserted.insert_id, Some(1));
}

#[tokio::test]
async fn failure_of_both_backends_is_critical() {
    let provider = CountingProvider::failing(true);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();

    let err = service.ensure_initialized().await.unwrap_err();
    assert_eq!(err.severity(), Severity::Critical);
    assert!(!err.recoverable());
    assert!(err.context_value("primary_error").is_some());
    assert_eq!(service.state(), ServiceState::Uninitialized);
    assert!(!service.is_connected());

    let err = service.query(COUNT_QUESTIONS, &[]).await.unwrap_err();
    assert_eq!(err.severity(), Severity::Critical);
    assert_eq!(provider.opens(), 2);
}

#[tokio::test]
async fn primary_failure_alone_is_not_an_error() {
    let provider = CountingProvider::failing(false);
    let service = AccessService::with_provider(test_config(), provider).unwrap();
    service.ensure_initialized().await.unwrap();
    let Some(BackendSelection::Fallback {
        reason,
    }) = service.config().selection
    else {
        panic!("expected fallback selection");
    };
    assert!(reason.contains("primary disabled"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_during_initialization_restarts_it() {
    let provider = CountingProvider::new(Duration::from_millis(100), Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();

    let waiter = {
        let service = service.clone();
        tokio::spawn(async move { service.ensure_initialized().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.state(), ServiceState::Initializing);
    let report = service.reset_database().await;
    assert!(report.removed.is_empty());

    waiter.await.unwrap().unwrap();
    assert_eq!(service.state(), ServiceState::Initialized);
    assert_eq!(provider.opens(), 2);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = AccessConfig {
        maintenance: MaintenanceConfig {
            enabled: true,
            interval_ms: 0,
        },
        ..test_config()
    };
    assert!(matches!(AccessService::new(config), Err(ConfigError::Invalid(_))));

    let config = AccessConfig {
        cache: CacheConfig {
            max_entries: 0,
            ..CacheConfig::default()
        },
        ..test_config()
    };
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let result = AccessService::with_provider(config, provider.clone());
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
    assert_eq!(provider.opens(), 0);
}

// ============================================================================
// SECTION: Tuning
// ============================================================================

#[tokio::test]
async fn failing_critical_tuning_does_not_fail_initialization() {
    let temp = TempDir::new().unwrap();
    let config = AccessConfig {
        tuning: TuningConfig {
            critical: vec!["NOT SQL".to_string(), "PRAGMA foreign_keys = ON".to_string()],
            background: Vec::new(),
        },
        ..sqlite_config(&temp)
    };
    let service = AccessService::new(config).unwrap();
    service.ensure_initialized().await.unwrap();

    let descriptor = service.config();
    assert_eq!(descriptor.backend, Some(BackendKind::Sqlite));
    assert!(matches!(descriptor.selection, Some(BackendSelection::Opened)));
    let pragma = service.query_with("PRAGMA foreign_keys", &[], CacheMode::Bypass).await.unwrap();
    assert_eq!(pragma.first_value("foreign_keys").and_then(SqlValue::as_integer), Some(1));
}

#[tokio::test]
async fn failing_background_tuning_step_does_not_stop_later_steps() {
    let failing = "INSERT INTO tuning_log (id) VALUES (?)";
    let applied = "INSERT INTO tuning_log (id) VALUES (1)";
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let config = AccessConfig {
        tuning: TuningConfig {
            critical: Vec::new(),
            background: vec![failing.to_string(), applied.to_string()],
        },
        ..test_config()
    };
    let service = AccessService::with_provider(config, provider.clone()).unwrap();
    service.ensure_initialized().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while provider.backend.executions_of(applied) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "background tuning stalled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(provider.backend.executions_of(failing), 1);
    assert_eq!(provider.backend.executions_of(applied), 1);
    assert!(service.is_connected());
    let logged = service.query("SELECT COUNT(*) AS count FROM tuning_log", &[]).await.unwrap();
    assert_eq!(count_of(&logged), Some(1));
}

// ============================================================================
// SECTION: Query Cache
// ============================================================================

#[tokio::test]
async fn repeated_read_hits_backend_once() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();

    let first = service.query(SELECT_QUESTIONS, &[]).await.unwrap();
    let second = service.query(SELECT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(provider.backend.executions_of(SELECT_QUESTIONS), 1);

    let stats = service.performance_stats();
    assert_eq!(stats.cache_size, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
}

#[tokio::test]
async fn different_params_are_different_keys() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    let statement = "SELECT * FROM questions WHERE id = ?";
    service.query(statement, &[SqlValue::from("Q1")]).await.unwrap();
    service.query(statement, &[SqlValue::from("Q2")]).await.unwrap();
    assert_eq!(provider.backend.executions_of(statement), 2);
}

#[tokio::test]
async fn non_finite_reals_and_null_are_different_keys() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    let statement = "SELECT * FROM questions WHERE score = ?";
    service.query(statement, &[SqlValue::Real(f64::INFINITY)]).await.unwrap();
    service.query(statement, &[SqlValue::Null]).await.unwrap();
    service.query(statement, &[SqlValue::Real(f64::NAN)]).await.unwrap();
    service.query(statement, &[SqlValue::Real(f64::INFINITY)]).await.unwrap();
    assert_eq!(provider.backend.executions_of(statement), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_reads_share_one_dispatch() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::from_millis(100));
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    service.ensure_initialized().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0 .. 8 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move { service.query(COUNT_QUESTIONS, &[]).await }));
    }
    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }
    assert_eq!(provider.backend.executions_of(COUNT_QUESTIONS), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(service.performance_stats().pending_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_waiter_does_not_cancel_dispatch() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::from_millis(100));
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    service.ensure_initialized().await.unwrap();

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.query(COUNT_QUESTIONS, &[]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.abort();

    let result = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&result), Some(0));
    assert_eq!(provider.backend.executions_of(COUNT_QUESTIONS), 1);
}

#[tokio::test]
async fn writes_never_enter_the_cache() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    for statement in [
        "INSERT INTO questions (id) VALUES ('Q1')",
        "UPDATE questions SET topic = 'x'",
        "DELETE FROM questions",
    ] {
        service.query_with(statement, &[], CacheMode::Use).await.unwrap();
        service.query_with(statement, &[], CacheMode::Use).await.unwrap();
        assert_eq!(provider.backend.executions_of(statement), 2);
    }
    assert_eq!(service.performance_stats().cache_size, 0);
}

#[tokio::test]
async fn bypass_mode_skips_the_cache() {
    let provider = CountingProvider::new(Duration::ZERO, Duration::ZERO);
    let service = AccessService::with_provider(test_config(), provider.clone()).unwrap();
    service.query_with(COUNT_QUESTIONS, &[], CacheMode::Bypass).await.unwrap();
    service.query_with(COUNT_QUESTIONS, &[], CacheMode::Bypass).await.unwrap();
    assert_eq!(provider.backend.executions_of(COUNT_QUESTIONS), 2);
    assert_eq!(service.performance_stats().cache_size, 0);
}

#[tokio::test]
async fn cached_reads_stay_stale_until_cleared() {
    let service = AccessService::new(test_config()).unwrap();
    let before = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&before), Some(0));

    service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();
    let stale = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&stale), Some(0));

    service.clear_cache();
    let fresh = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&fresh), Some(1));
}

#[tokio::test]
async fn cached_reads_refresh_after_ttl() {
    let config = AccessConfig {
        cache: CacheConfig {
            ttl_ms: 50,
            ..CacheConfig::default()
        },
        ..test_config()
    };
    let service = AccessService::new(config).unwrap();
    service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    let fresh = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&fresh), Some(1));
}

#[tokio::test]
async fn maintenance_loop_sweeps_expired_entries() {
    let config = AccessConfig {
        cache: CacheConfig {
            ttl_ms: 20,
            ..CacheConfig::default()
        },
        maintenance: MaintenanceConfig {
            enabled: true,
            interval_ms: 100,
        },
        ..test_config()
    };
    let service = AccessService::new(config).unwrap();
    service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(service.performance_stats().cache_size, 1);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(service.performance_stats().cache_size, 0);
}

#[tokio::test]
async fn manual_maintenance_reports_evictions() {
    let config = AccessConfig {
        cache: CacheConfig {
            ttl_ms: 10,
            ..CacheConfig::default()
        },
        ..test_config()
    };
    let service = AccessService::new(config).unwrap();
    service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    let report = service.perform_maintenance();
    assert_eq!(report.expired_evicted, 1);
    assert_eq!(report.cache_size, 0);
    assert_eq!(service.perform_maintenance().expired_evicted, 0);
}

// ============================================================================
// SECTION: Statement Failures
// ============================================================================

#[tokio::test]
async fn statement_failure_is_high_with_context() {
    let service = AccessService::new(test_config()).unwrap();
    let err = service.query(INSERT_QUESTION, &[]).await.unwrap_err();
    assert_eq!(err.severity(), Severity::High);
    assert!(err.recoverable());
    assert_eq!(err.code(), "STATEMENT");
    assert_eq!(err.context_value("statement"), Some(&serde_json::json!(INSERT_QUESTION)));
    assert_eq!(err.context_value("params"), Some(&serde_json::json!([])));
    assert!(err.context_value("timestamp").is_some());

    let stats = service.performance_stats().latency;
    assert_eq!(stats.query_count, 1);
    assert_eq!(stats.query_errors, 1);
}

// ============================================================================
// SECTION: Reset And Close
// ============================================================================

fn sqlite_config(temp: &TempDir) -> AccessConfig {
    AccessConfig {
        maintenance: MaintenanceConfig {
            enabled: false,
            ..MaintenanceConfig::default()
        },
        ..AccessConfig::for_sqlite_path(temp.path().join("studybank.db"))
    }
}

#[tokio::test]
async fn reset_removes_sqlite_artifacts() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("studybank.db");
    let service = AccessService::new(sqlite_config(&temp)).unwrap();
    service.query("CREATE TABLE questions (id TEXT PRIMARY KEY)", &[]).await.unwrap();
    service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();
    assert_eq!(service.config().backend, Some(BackendKind::Sqlite));
    assert_eq!(service.config().path, Some(path.clone()));
    assert!(service.config().size_bytes > 0);

    let report = service.reset_database().await;
    assert!(report.removed.contains(&path));
    assert!(!path.exists());
    assert_eq!(service.state(), ServiceState::Uninitialized);
    assert_eq!(service.performance_stats().cache_size, 0);

    let err = service.query(COUNT_QUESTIONS, &[]).await.unwrap_err();
    assert_eq!(err.severity(), Severity::High);
    assert_eq!(service.state(), ServiceState::Initialized);
}

#[tokio::test]
async fn close_keeps_sqlite_data() {
    let temp = TempDir::new().unwrap();
    let service = AccessService::new(sqlite_config(&temp)).unwrap();
    service.query("CREATE TABLE questions (id TEXT PRIMARY KEY)", &[]).await.unwrap();
    service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();
    service.close().await;
    assert!(!service.is_connected());

    let result = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&result), Some(1));
}

#[tokio::test]
async fn simulated_data_does_not_survive_reset() {
    let service = AccessService::new(test_config()).unwrap();
    service.query(INSERT_QUESTION, &[SqlValue::from("Q1")]).await.unwrap();
    service.reset_database().await;
    let result = service.query(COUNT_QUESTIONS, &[]).await.unwrap();
    assert_eq!(count_of(&result), Some(0));
}

#[tokio::test]
async fn optimize_runs_on_both_backends() {
    let temp = TempDir::new().unwrap();
    let sqlite = AccessService::new(sqlite_config(&temp)).unwrap();
    sqlite.optimize().await.unwrap();
    let simulated = AccessService::new(test_config()).unwrap();
    simulated.optimize().await.unwrap();
}

#[tokio::test]
async fn config_reports_descriptor_before_and_after_init() {
    let service = AccessService::new(test_config()).unwrap();
    let before = service.config();
    assert!(!before.connected);
    assert_eq!(before.backend, None);
    assert_eq!(before.name, "studybank");
    assert_eq!(before.max_cache_entries, 100);

    service.ensure_initialized().await.unwrap();
    let after = service.config();
    assert!(after.connected);
    assert_eq!(after.backend, Some(BackendKind::Simulated));
    assert_eq!(after.size_bytes, 0);
}
