// crates/studybank-access/src/service.rs
// ============================================================================
// Module: Access Service
// Description: Store lifecycle, cached reads, batches, and introspection.
// Purpose: Give every caller one shared, lazily initialized store handle.
// Dependencies: serde, serde_json, studybank-core, tokio, tracing
// ============================================================================

//! ## Overview
//! [`AccessService`] is a cheap-to-clone handle over shared state. The first
//! call on any entry point initializes the store; concurrent first callers
//! share that one initialization instead of racing to open the backend.
//!
//! Initialization state machine:
//! - `Uninitialized`: the next caller publishes an outcome channel, moves to
//!   `Initializing`, and spawns the initialization task.
//! - `Initializing`: callers await the published outcome.
//! - `Initialized`: callers receive the store handle immediately.
//!
//! The initialization task opens the primary backend, falls back to the
//! provider's fallback on failure, applies the critical tuning statements,
//! installs the handle, and then spawns background tuning. Only when both
//! backends fail is a `Critical` error returned, and the state goes back to
//! `Uninitialized`. A reset or close during initialization bumps the
//! generation, so the abandoned task closes its backend instead of
//! installing it and its waiters re-enter the state machine.
//!
//! Read statements go through the [`QueryCache`]: live entries are returned
//! directly, identical concurrent reads share one dispatch, and the dispatch
//! runs in its own task so cancelling a waiter never cancels it. Writes and
//! batches bypass the cache and invalidate nothing: a cached read may be
//! stale for up to one TTL after a write.
//!
//! Backend calls are blocking and run through `spawn_blocking`. Internal
//! locks are held for single map operations and never across an `.await`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use studybank_core::BackendError;
use studybank_core::BackendKind;
use studybank_core::BatchStatement;
use studybank_core::QueryResult;
use studybank_core::Severity;
use studybank_core::SqlValue;
use studybank_core::StoreBackend;
use studybank_core::StoreError;
use studybank_core::is_read_only;
use tokio::sync::watch;
use tokio::task;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::cache::CacheLookup;
use crate::cache::QueryCache;
use crate::cache::statement_key;
use crate::config::AccessConfig;
use crate::config::ConfigError;
use crate::maintenance::spawn_maintenance_loop;
use crate::provider::BackendProvider;
use crate::provider::BackendSelection;
use crate::provider::provider_for;
use crate::stats::DispatchKind;
use crate::stats::PerformanceStats;
use crate::stats::QueryStats;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Statements run by [`AccessService::optimize`].
const OPTIMIZE_STATEMENTS: [&str; 2] = ["ANALYZE", "PRAGMA optimize"];

// ============================================================================
// SECTION: Public Types
// ============================================================================

/// Whether a read may be served from and stored into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Consult and populate the cache for read statements.
    #[default]
    Use,
    /// Dispatch directly to the backend.
    Bypass,
}

/// Observable lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No backend is open.
    Uninitialized,
    /// A backend is being opened.
    Initializing,
    /// A backend is serving requests.
    Initialized,
}

/// Successful batch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Always `true`; failures are reported as errors.
    pub success: bool,
    /// Statements executed.
    pub statements: usize,
}

/// Read-only description of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreDescriptor {
    /// Configured store name.
    pub name: String,
    /// Configured store version.
    pub version: String,
    /// Store location when file-backed.
    pub path: Option<PathBuf>,
    /// On-disk size in bytes.
    pub size_bytes: u64,
    /// Active backend family.
    pub backend: Option<BackendKind>,
    /// Backend selection made at initialization.
    pub selection: Option<BackendSelection>,
    /// Whether a backend is serving requests.
    pub connected: bool,
    /// Cache TTL in milliseconds.
    pub cache_ttl_ms: u64,
    /// Cache capacity bound.
    pub max_cache_entries: usize,
}

/// Result of one maintenance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Expired entries removed.
    pub expired_evicted: usize,
    /// Entries left after the pass.
    pub cache_size: usize,
    /// Reads in flight during the pass.
    pub pending_count: usize,
}

/// Result of a database reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// On-disk artifacts removed.
    pub removed: Vec<PathBuf>,
}

// ============================================================================
// SECTION: Internal State
// ============================================================================

/// Backend serving requests plus how it was selected.
#[derive(Clone)]
struct StoreHandle {
    /// Active backend.
    backend: Arc<dyn StoreBackend>,
    /// Selection outcome.
    selection: BackendSelection,
}

/// Outcome slot shared by callers awaiting initialization.
type InitOutcome = Option<Result<(), StoreError>>;

/// Initialization state machine.
enum InitState {
    /// No backend open.
    Uninitialized,
    /// Initialization task running.
    Initializing {
        /// Generation owning the task.
        generation: u64,
        /// Outcome published by the task.
        outcome: watch::Receiver<InitOutcome>,
    },
    /// Backend installed.
    Initialized {
        /// Installed handle.
        handle: StoreHandle,
    },
}

/// What a caller of [`ServiceInner::begin_or_join`] should do next.
enum InitEntry {
    /// Handle available.
    Ready(StoreHandle),
    /// Await the outcome of the initialization owned by `generation`.
    Wait {
        /// Generation owning the initialization.
        generation: u64,
        /// Outcome published by the initialization task.
        outcome: watch::Receiver<InitOutcome>,
    },
}

/// Shared service state.
///
/// # Invariants
/// - Exactly one [`InitState`] holds at a time.
/// - Only the task owning the current generation installs a handle.
pub(crate) struct ServiceInner {
    /// Validated configuration.
    config: AccessConfig,
    /// Backend factory.
    provider: Arc<dyn BackendProvider>,
    /// Lifecycle state.
    state: Mutex<InitState>,
    /// Last generation handed out.
    generation: AtomicU64,
    /// Read cache and in-flight table.
    cache: QueryCache,
    /// Dispatch counters.
    stats: QueryStats,
    /// Set once the maintenance loop is spawned.
    maintenance_started: AtomicBool,
}

impl ServiceInner {
    /// Returns the installed handle or joins/starts initialization.
    fn begin_or_join(self: &Arc<Self>) -> InitEntry {
        let mut state = self.lock_state();
        if let InitState::Initialized {
            handle,
        } = &*state
        {
            return InitEntry::Ready(handle.clone());
        }
        if let InitState::Initializing {
            generation,
            outcome,
        } = &*state
        {
            return InitEntry::Wait {
                generation: *generation,
                outcome: outcome.clone(),
            };
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        let (sender, receiver) = watch::channel(None);
        *state = InitState::Initializing {
            generation,
            outcome: receiver.clone(),
        };
        drop(state);
        debug!(generation, "store initialization started");
        tokio::spawn(initialize(Arc::clone(self), generation, sender));
        InitEntry::Wait {
            generation,
            outcome: receiver,
        }
    }

    /// Installs `handle` when `generation` still owns initialization.
    fn install(self: &Arc<Self>, generation: u64, handle: StoreHandle) {
        let installed = {
            let mut state = self.lock_state();
            let current = matches!(
                &*state,
                InitState::Initializing { generation: pending, .. } if *pending == generation
            );
            if current {
                *state = InitState::Initialized {
                    handle: handle.clone(),
                };
            }
            current
        };
        if !installed {
            debug!(generation, "discarding initialization superseded by reset");
            close_detached(handle.backend);
            return;
        }
        info!(
            generation,
            backend = handle.backend.kind().as_str(),
            fallback = handle.selection.is_fallback(),
            "store initialized"
        );
        spawn_background_tuning(Arc::clone(&handle.backend), self.config.tuning.background.clone());
        self.start_maintenance();
    }

    /// Returns to `Uninitialized` after a failed or lost initialization.
    fn abandon(&self, generation: u64) {
        let mut state = self.lock_state();
        if matches!(
            &*state,
            InitState::Initializing { generation: pending, .. } if *pending == generation
        ) {
            *state = InitState::Uninitialized;
        }
    }

    /// Returns the installed handle, if any.
    fn current_handle(&self) -> Option<StoreHandle> {
        match &*self.lock_state() {
            InitState::Initialized {
                handle,
            } => Some(handle.clone()),
            InitState::Uninitialized
            | InitState::Initializing {
                ..
            } => None,
        }
    }

    /// Returns to `Uninitialized`, clearing the cache, and yields the
    /// previously installed handle.
    fn take_handle(&self) -> Option<StoreHandle> {
        let previous = std::mem::replace(&mut *self.lock_state(), InitState::Uninitialized);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
        match previous {
            InitState::Initialized {
                handle,
            } => Some(handle),
            InitState::Uninitialized
            | InitState::Initializing {
                ..
            } => None,
        }
    }

    /// Spawns the maintenance loop once per service.
    fn start_maintenance(self: &Arc<Self>) {
        if !self.config.maintenance.enabled || self.maintenance_started.swap(true, Ordering::AcqRel)
        {
            return;
        }
        spawn_maintenance_loop(Arc::downgrade(self), self.config.maintenance.interval());
    }

    /// Evicts expired cache entries.
    pub(crate) fn run_maintenance(&self) -> MaintenanceReport {
        let expired_evicted = self.cache.evict_expired();
        let report = MaintenanceReport {
            expired_evicted,
            cache_size: self.cache.len(),
            pending_count: self.cache.pending_count(),
        };
        debug!(
            expired_evicted,
            cache_size = report.cache_size,
            pending = report.pending_count,
            "store maintenance pass completed"
        );
        report
    }

    /// Locks the lifecycle state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, InitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Access Service
// ============================================================================

/// Shared handle to the data-store access layer.
///
/// # Invariants
/// - Clones share one backend handle, cache, and lifecycle.
#[derive(Clone)]
pub struct AccessService {
    /// Shared state.
    inner: Arc<ServiceInner>,
}

impl AccessService {
    /// Creates a service using the provider described by `config.store`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` fails validation.
    pub fn new(config: AccessConfig) -> Result<Self, ConfigError> {
        let provider = provider_for(&config.store);
        Self::with_provider(config, provider)
    }

    /// Creates a service with an explicit backend provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` fails validation.
    pub fn with_provider(
        config: AccessConfig,
        provider: Arc<dyn BackendProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = QueryCache::new(&config.cache);
        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                provider,
                state: Mutex::new(InitState::Uninitialized),
                generation: AtomicU64::new(0),
                cache,
                stats: QueryStats::default(),
                maintenance_started: AtomicBool::new(false),
            }),
        })
    }

    /// Initializes the store if needed, sharing any initialization already
    /// in progress.
    ///
    /// # Errors
    ///
    /// Returns a `Critical` [`StoreError`] when no backend could be opened.
    pub async fn ensure_initialized(&self) -> Result<(), StoreError> {
        self.handle().await.map(|_| ())
    }

    /// Executes a statement, using the cache for read statements.
    ///
    /// # Errors
    ///
    /// Returns a `High` [`StoreError`] when the statement fails, or a
    /// `Critical` one when no backend could be opened.
    pub async fn query(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, StoreError> {
        self.query_with(statement, params, CacheMode::Use).await
    }

    /// Executes a statement with an explicit cache mode.
    ///
    /// # Errors
    ///
    /// Returns a `High` [`StoreError`] when the statement fails, or a
    /// `Critical` one when no backend could be opened.
    pub async fn query_with(
        &self,
        statement: &str,
        params: &[SqlValue],
        mode: CacheMode,
    ) -> Result<QueryResult, StoreError> {
        let handle = self.handle().await?;
        if mode == CacheMode::Use && is_read_only(statement) {
            return self.cached_read(&handle, statement, params).await;
        }
        dispatch(&self.inner, Arc::clone(&handle.backend), statement.to_string(), params.to_vec())
            .await
    }

    /// Executes statements in one transaction scope.
    ///
    /// Atomicity is whatever the active backend provides: the `SQLite`
    /// backend rolls back on failure, the simulated backend does not.
    ///
    /// # Errors
    ///
    /// Returns a `High` [`StoreError`] naming the failing statement.
    pub async fn execute_batch(
        &self,
        statements: Vec<BatchStatement>,
    ) -> Result<BatchOutcome, StoreError> {
        let handle = self.handle().await?;
        let count = statements.len();
        let backend = handle.backend;
        let started = Instant::now();
        let outcome = task::spawn_blocking(move || {
            backend.execute_batch(&statements).map_err(|err| batch_error(&err, &statements))
        })
        .await
        .unwrap_or_else(|err| {
            Err(StoreError::unknown("batch task failed", Severity::High, &err.to_string()))
        });
        self.inner.stats.record(DispatchKind::Batch, started.elapsed(), outcome.is_err());
        outcome.map(|()| BatchOutcome {
            success: true,
            statements: count,
        })
    }

    /// Returns true when a backend is installed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.current_handle().is_some()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        match &*self.inner.lock_state() {
            InitState::Uninitialized => ServiceState::Uninitialized,
            InitState::Initializing {
                ..
            } => ServiceState::Initializing,
            InitState::Initialized {
                ..
            } => ServiceState::Initialized,
        }
    }

    /// Describes the store and the active backend.
    #[must_use]
    pub fn config(&self) -> StoreDescriptor {
        let config = &self.inner.config;
        let handle = self.inner.current_handle();
        StoreDescriptor {
            name: config.name.clone(),
            version: config.version.clone(),
            path: handle.as_ref().and_then(|handle| handle.backend.location()),
            size_bytes: handle.as_ref().map_or(0, |handle| handle.backend.size_bytes()),
            backend: handle.as_ref().map(|handle| handle.backend.kind()),
            connected: handle.is_some(),
            selection: handle.map(|handle| handle.selection),
            cache_ttl_ms: config.cache.ttl_ms,
            max_cache_entries: config.cache.max_entries,
        }
    }

    /// Returns cache and dispatch statistics.
    #[must_use]
    pub fn performance_stats(&self) -> PerformanceStats {
        let cache = &self.inner.cache;
        PerformanceStats {
            cache_size: cache.len(),
            cache_hit_rate_estimate: cache.hit_rate(),
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            pending_count: cache.pending_count(),
            memory_estimate_bytes: cache.memory_estimate_bytes(),
            latency: self.inner.stats.snapshot(),
        }
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        info!("store cache cleared");
    }

    /// Runs one maintenance pass now.
    pub fn perform_maintenance(&self) -> MaintenanceReport {
        self.inner.run_maintenance()
    }

    /// Refreshes planner statistics on the active backend.
    ///
    /// # Errors
    ///
    /// Returns a `Medium` [`StoreError`] when a step fails.
    pub async fn optimize(&self) -> Result<(), StoreError> {
        let handle = self.handle().await?;
        let backend = handle.backend;
        task::spawn_blocking(move || -> Result<(), StoreError> {
            for statement in OPTIMIZE_STATEMENTS {
                backend.execute(statement, &[]).map_err(|err| {
                    StoreError::from_backend("store optimization failed", Severity::Medium, &err)
                        .with_context("operation", "optimize")
                        .with_context("statement", statement)
                })?;
            }
            Ok(())
        })
        .await
        .unwrap_or_else(|err| {
            Err(StoreError::unknown("optimization task failed", Severity::Medium, &err.to_string()))
        })
        .inspect_err(|err| warn!(error = %err, "store optimization failed"))
    }

    /// Closes the backend, clears derived state, and removes on-disk
    /// artifacts. Removal failures are logged, never returned.
    pub async fn reset_database(&self) -> ResetReport {
        let Some(handle) = self.inner.take_handle() else {
            info!("store reset with no open backend");
            return ResetReport::default();
        };
        let removed = task::spawn_blocking(move || {
            close_backend(handle.backend.as_ref());
            handle.backend.remove_artifacts().unwrap_or_else(|err| {
                warn!(error = %err, "failed to remove store artifacts");
                Vec::new()
            })
        })
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "store reset task failed");
            Vec::new()
        });
        info!(removed = removed.len(), "store reset");
        ResetReport {
            removed,
        }
    }

    /// Closes the backend and clears derived state, keeping on-disk data.
    pub async fn close(&self) {
        let Some(handle) = self.inner.take_handle() else {
            return;
        };
        let closed = task::spawn_blocking(move || close_backend(handle.backend.as_ref())).await;
        if let Err(err) = closed {
            warn!(error = %err, "store close task failed");
        }
        info!("store closed");
    }

    /// Returns the installed handle, initializing when needed.
    async fn handle(&self) -> Result<StoreHandle, StoreError> {
        loop {
            let (generation, mut outcome) = match self.inner.begin_or_join() {
                InitEntry::Ready(handle) => return Ok(handle),
                InitEntry::Wait {
                    generation,
                    outcome,
                } => (generation, outcome),
            };
            match outcome.wait_for(Option::is_some).await.map(|value| value.clone()) {
                Ok(Some(Err(err))) => return Err(err),
                Ok(_) => {}
                Err(_) => {
                    warn!(generation, "store initialization lost before publishing; restarting");
                    self.inner.abandon(generation);
                }
            }
        }
    }

    /// Serves a read through the cache and in-flight table.
    async fn cached_read(
        &self,
        handle: &StoreHandle,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, StoreError> {
        let key = statement_key(statement, params);
        loop {
            let mut receiver = match self.inner.cache.lookup_or_register(&key) {
                CacheLookup::Hit(result) => return Ok(result),
                CacheLookup::Wait(receiver) => receiver,
                CacheLookup::Dispatch(ticket) => {
                    let receiver = ticket.subscribe();
                    let inner = Arc::clone(&self.inner);
                    let backend = Arc::clone(&handle.backend);
                    let statement = statement.to_string();
                    let params = params.to_vec();
                    tokio::spawn(async move {
                        let outcome = dispatch(&inner, backend, statement, params).await;
                        inner.cache.complete(ticket, outcome);
                    });
                    receiver
                }
            };
            let resolved = receiver.wait_for(Option::is_some).await.map(|value| value.clone());
            if let Ok(Some(outcome)) = resolved {
                return outcome;
            }
            debug!("in-flight read dropped before publishing; retrying lookup");
        }
    }
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Opens a backend, installs it, and publishes the outcome.
async fn initialize(
    inner: Arc<ServiceInner>,
    generation: u64,
    outcome: watch::Sender<InitOutcome>,
) {
    let provider = Arc::clone(&inner.provider);
    let critical = inner.config.tuning.critical.clone();
    let opened = task::spawn_blocking(move || open_store(provider.as_ref(), &critical))
        .await
        .unwrap_or_else(|err| {
            Err(StoreError::unknown(
                "store initialization task failed",
                Severity::Critical,
                &err.to_string(),
            ))
        });
    let result = match opened {
        Ok(handle) => {
            inner.install(generation, handle);
            Ok(())
        }
        Err(err) => {
            error!(generation, error = %err, "store initialization failed");
            inner.abandon(generation);
            Err(err)
        }
    };
    outcome.send_replace(Some(result));
}

/// Selects a backend and applies critical configuration.
fn open_store(
    provider: &dyn BackendProvider,
    critical: &[String],
) -> Result<StoreHandle, StoreError> {
    let (backend, selection) = match provider.open_primary() {
        Ok(backend) => (backend, BackendSelection::Opened),
        Err(primary) => {
            warn!(error = %primary, "primary store unavailable; falling back");
            let fallback = provider.open_fallback().map_err(|fallback| {
                StoreError::from_backend(
                    "no store backend could be opened",
                    Severity::Critical,
                    &fallback,
                )
                .with_context("primary_error", primary.to_string())
            })?;
            let reason = primary.to_string();
            (
                fallback,
                BackendSelection::Fallback {
                    reason,
                },
            )
        }
    };
    for statement in critical {
        if let Err(err) = backend.execute(statement, &[]) {
            warn!(statement = statement.as_str(), error = %err, "critical store setting failed");
        }
    }
    Ok(StoreHandle {
        backend,
        selection,
    })
}

/// Runs background tuning without blocking any caller.
fn spawn_background_tuning(backend: Arc<dyn StoreBackend>, statements: Vec<String>) {
    if statements.is_empty() {
        return;
    }
    task::spawn_blocking(move || {
        for statement in &statements {
            match backend.execute(statement, &[]) {
                Ok(_) => debug!(statement = statement.as_str(), "background tuning step applied"),
                Err(err) => {
                    let failure = StoreError::from_backend(
                        "background tuning step failed",
                        Severity::Medium,
                        &err,
                    )
                    .with_context("statement", statement.as_str());
                    warn!(error = %failure, "background tuning step failed");
                }
            }
        }
    });
}

/// Closes a backend on a blocking thread without waiting.
fn close_detached(backend: Arc<dyn StoreBackend>) {
    task::spawn_blocking(move || close_backend(backend.as_ref()));
}

/// Closes a backend, logging failures.
fn close_backend(backend: &dyn StoreBackend) {
    if let Err(err) = backend.close() {
        warn!(backend = backend.kind().as_str(), error = %err, "store close failed");
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Runs one statement on a blocking thread and records its latency.
async fn dispatch(
    inner: &ServiceInner,
    backend: Arc<dyn StoreBackend>,
    statement: String,
    params: Vec<SqlValue>,
) -> Result<QueryResult, StoreError> {
    let started = Instant::now();
    let outcome = task::spawn_blocking(move || {
        backend.execute(&statement, &params).map_err(|err| statement_error(&err, &statement, &params))
    })
    .await
    .unwrap_or_else(|err| {
        Err(StoreError::unknown("statement task failed", Severity::High, &err.to_string()))
    });
    inner.stats.record(DispatchKind::Statement, started.elapsed(), outcome.is_err());
    outcome
}

/// Classifies a statement failure, attaching the statement and parameters.
fn statement_error(err: &BackendError, statement: &str, params: &[SqlValue]) -> StoreError {
    let failure = StoreError::from_backend("statement execution failed", Severity::High, err)
        .with_context("statement", statement)
        .with_context("params", encode_params(params));
    warn!(code = failure.code(), error = %err, "statement execution failed");
    failure
}

/// Classifies a batch failure, attaching the failing statement.
fn batch_error(err: &BackendError, statements: &[BatchStatement]) -> StoreError {
    let mut failure = StoreError::from_backend("batch execution failed", Severity::High, err)
        .with_context("batch_size", statements.len());
    if let Some(failed) = err.batch_index().and_then(|index| statements.get(index)) {
        failure = failure
            .with_context("statement", failed.text.as_str())
            .with_context("params", encode_params(&failed.params));
    }
    warn!(code = failure.code(), error = %err, "batch execution failed");
    failure
}

/// Encodes parameters for error context.
fn encode_params(params: &[SqlValue]) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
