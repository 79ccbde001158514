// crates/studybank-access/src/cache.rs
// ============================================================================
// Module: Query Cache
// Description: TTL read cache with an in-flight table for duplicate reads.
// Purpose: Serve repeated reads without backend calls and collapse concurrent
//          identical reads into one dispatch.
// Dependencies: serde_json, studybank-core, tokio
// ============================================================================

//! ## Overview
//! [`QueryCache`] maps a statement key (statement text, a unit separator, and
//! the type-tagged parameters) to a previously observed read result. Every
//! entry shares one TTL. When the cache is full, the `eviction_batch` entries
//! with the oldest `created_at` are dropped before the insert: eviction is
//! by insertion order, not by last access.
//!
//! The in-flight table tracks reads dispatched but not yet resolved. A
//! lookup for a key already in flight returns a receiver on the same
//! outcome channel instead of a new dispatch. [`QueryCache::clear`] bumps a
//! generation counter so results of reads dispatched before the clear are
//! delivered to their waiters but never cached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use studybank_core::QueryResult;
use studybank_core::SqlValue;
use studybank_core::StoreError;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::CacheConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between statement text and encoded parameters in a key.
const KEY_SEPARATOR: char = '\u{1f}';

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome slot shared between a dispatched read and its waiters.
pub(crate) type SharedOutcome = Option<Result<QueryResult, StoreError>>;

/// Cached read result.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Observed result.
    result: QueryResult,
    /// Insertion time.
    created_at: Instant,
    /// `created_at + ttl`.
    expires_at: Instant,
}

/// Read dispatched to the backend and not yet resolved.
#[derive(Debug)]
struct InFlight {
    /// Dispatch id matching the owning [`DispatchTicket`].
    id: u64,
    /// Outcome channel handed to waiters.
    receiver: watch::Receiver<SharedOutcome>,
}

/// Mutable cache state behind one lock.
#[derive(Debug, Default)]
struct CacheState {
    /// Cached results keyed by statement key.
    entries: HashMap<String, CacheEntry>,
    /// Outstanding reads keyed by statement key.
    in_flight: HashMap<String, InFlight>,
    /// Bumped on every clear.
    generation: u64,
    /// Next dispatch id.
    next_dispatch: u64,
}

/// Result of [`QueryCache::lookup_or_register`].
#[derive(Debug)]
pub(crate) enum CacheLookup {
    /// Live cached result.
    Hit(QueryResult),
    /// Identical read already in flight; await its outcome.
    Wait(watch::Receiver<SharedOutcome>),
    /// Caller owns a new dispatch and must complete the ticket.
    Dispatch(DispatchTicket),
}

/// Ownership of one in-flight read.
///
/// # Invariants
/// - Completed exactly once through [`QueryCache::complete`]; dropping it
///   without completing closes the channel and waiters retry.
#[derive(Debug)]
pub(crate) struct DispatchTicket {
    /// Statement key.
    key: String,
    /// Dispatch id.
    id: u64,
    /// Cache generation at registration.
    generation: u64,
    /// Outcome publisher.
    sender: watch::Sender<SharedOutcome>,
}

impl DispatchTicket {
    /// Returns a receiver on this dispatch's outcome.
    pub(crate) fn subscribe(&self) -> watch::Receiver<SharedOutcome> {
        self.sender.subscribe()
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Bounded TTL cache of read results.
///
/// # Invariants
/// - At most one entry per statement key.
/// - `len() <= max_entries` after every insert.
/// - A key present in flight is never dispatched a second time.
#[derive(Debug)]
pub struct QueryCache {
    /// Entry time-to-live.
    ttl: Duration,
    /// Capacity bound.
    max_entries: usize,
    /// Entries evicted when full.
    eviction_batch: usize,
    /// Entries, in-flight table, and generation.
    state: Mutex<CacheState>,
    /// Lookups served without a new dispatch.
    hits: AtomicU64,
    /// Lookups that required a dispatch.
    misses: AtomicU64,
}

impl QueryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_entries,
            eviction_batch: config.eviction_batch,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the live entry for `key`, dropping it when expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<QueryResult> {
        self.get_at(key, Instant::now())
    }

    /// Returns the live entry for `key` as of `now`.
    #[must_use]
    pub fn get_at(&self, key: &str, now: Instant) -> Option<QueryResult> {
        let mut state = self.lock_state();
        let result = live_entry(&mut state, key, now);
        self.count(result.is_some());
        result
    }

    /// Stores `result` under `key` with a fresh TTL.
    pub fn put(&self, key: &str, result: QueryResult) {
        self.put_at(key, result, Instant::now());
    }

    /// Stores `result` under `key` as of `now`.
    pub fn put_at(&self, key: &str, result: QueryResult, now: Instant) {
        let mut state = self.lock_state();
        self.insert_locked(&mut state, key.to_string(), result, now);
    }

    /// Removes every expired entry, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    /// Removes entries expired as of `now`.
    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut state = self.lock_state();
        let before = state.entries.len();
        state.entries.retain(|_, entry| now < entry.expires_at);
        before - state.entries.len()
    }

    /// Removes the `count` oldest entries by insertion time.
    pub fn evict_oldest(&self, count: usize) -> usize {
        let mut state = self.lock_state();
        evict_oldest_locked(&mut state, count)
    }

    /// Drops all entries and in-flight registrations.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.entries.clear();
        state.in_flight.clear();
        state.generation = state.generation.saturating_add(1);
    }

    /// Returns the number of cached entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Returns true when no entries are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    /// Returns the number of reads in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_state().in_flight.len()
    }

    /// Returns a rough byte estimate of cached keys and results.
    #[must_use]
    pub fn memory_estimate_bytes(&self) -> usize {
        self.lock_state()
            .entries
            .iter()
            .map(|(key, entry)| key.len().saturating_add(entry.result.estimated_bytes()))
            .fold(0, usize::saturating_add)
    }

    /// Returns the number of lookups served without a new dispatch.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups that dispatched.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns `hits / (hits + misses)`, or zero before the first lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Hit rate is an estimate.")]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits.saturating_add(self.misses());
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Returns the entry TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the capacity bound.
    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Resolves a read: cached result, existing dispatch, or a new ticket.
    pub(crate) fn lookup_or_register(&self, key: &str) -> CacheLookup {
        let mut state = self.lock_state();
        if let Some(result) = live_entry(&mut state, key, Instant::now()) {
            self.count(true);
            return CacheLookup::Hit(result);
        }
        if let Some(flight) = state.in_flight.get(key)
            && flight.receiver.has_changed().is_ok()
        {
            self.count(true);
            return CacheLookup::Wait(flight.receiver.clone());
        }
        let (sender, receiver) = watch::channel(None);
        let id = state.next_dispatch;
        state.next_dispatch = state.next_dispatch.wrapping_add(1);
        state.in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                receiver,
            },
        );
        self.count(false);
        CacheLookup::Dispatch(DispatchTicket {
            key: key.to_string(),
            id,
            generation: state.generation,
            sender,
        })
    }

    /// Publishes a dispatch outcome, caching successes from the current
    /// generation before the in-flight entry is removed.
    pub(crate) fn complete(&self, ticket: DispatchTicket, outcome: Result<QueryResult, StoreError>) {
        {
            let mut state = self.lock_state();
            if let Ok(result) = &outcome
                && state.generation == ticket.generation
            {
                self.insert_locked(&mut state, ticket.key.clone(), result.clone(), Instant::now());
            }
            if state.in_flight.get(&ticket.key).is_some_and(|flight| flight.id == ticket.id) {
                state.in_flight.remove(&ticket.key);
            }
        }
        ticket.sender.send_replace(Some(outcome));
    }

    /// Inserts an entry, evicting the oldest batch when at capacity.
    fn insert_locked(&self, state: &mut CacheState, key: String, result: QueryResult, now: Instant) {
        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            evict_oldest_locked(state, self.eviction_batch);
        }
        state.entries.insert(
            key,
            CacheEntry {
                result,
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Bumps the hit or miss counter.
    fn count(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Locks the cache state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds the cache and dedup identity of a read.
///
/// Each parameter is encoded as a `[tag, value]` pair with reals written as
/// their IEEE-754 bits, so distinct values never share a key.
#[must_use]
pub fn statement_key(statement: &str, params: &[SqlValue]) -> String {
    let encoded = Value::Array(params.iter().map(key_param).collect());
    format!("{statement}{KEY_SEPARATOR}{encoded}")
}

/// Encodes one parameter for a statement key.
fn key_param(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => json!(["n"]),
        SqlValue::Integer(value) => json!(["i", value]),
        SqlValue::Real(value) => json!(["r", value.to_bits()]),
        SqlValue::Text(value) => json!(["t", value]),
        SqlValue::Blob(value) => json!(["b", value]),
    }
}

/// Returns a clone of the live entry for `key`, removing it when expired.
fn live_entry(state: &mut CacheState, key: &str, now: Instant) -> Option<QueryResult> {
    let entry = state.entries.get(key)?;
    if now < entry.expires_at {
        return Some(entry.result.clone());
    }
    state.entries.remove(key);
    None
}

/// Removes the `count` entries with the oldest `created_at`.
fn evict_oldest_locked(state: &mut CacheState, count: usize) -> usize {
    let mut by_age: Vec<(Instant, String)> =
        state.entries.iter().map(|(key, entry)| (entry.created_at, key.clone())).collect();
    by_age.sort();
    let mut removed = 0;
    for (_, key) in by_age.into_iter().take(count) {
        if state.entries.remove(&key).is_some() {
            removed += 1;
        }
    }
    removed
}

// ============================================================================
// SECTION: Tests
// ============================================================================
