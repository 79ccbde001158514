// crates/studybank-access/src/stats.rs
// ============================================================================
// Module: Access Performance Stats
// Description: Query counters and bucketed latency histograms.
// Purpose: Back the performance-stats introspection call.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`QueryStats`] counts backend dispatches and failures and buckets their
//! latency into fixed millisecond bounds. Percentiles are estimated from the
//! buckets, so p50/p95 report the upper bound of the matching bucket.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency bucket upper bounds in milliseconds.
const LATENCY_BUCKETS_MS: [u64; 10] = [1, 2, 5, 10, 20, 50, 100, 250, 500, 1_000];

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Backend dispatch counters and latency estimates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    /// Statements dispatched to the backend.
    pub query_count: u64,
    /// Dispatches that failed.
    pub query_errors: u64,
    /// Batches dispatched to the backend.
    pub batch_count: u64,
    /// Latencies represented as `<= upper_bound` buckets plus overflow slot.
    pub latency_buckets_ms: Vec<u64>,
    /// Histogram counts (length = `latency_buckets_ms.len() + 1`).
    pub latency_histogram: Vec<u64>,
    /// Cumulative dispatch duration in milliseconds.
    pub total_duration_ms: u64,
    /// p50 latency estimate from the histogram.
    pub latency_p50_ms: u64,
    /// p95 latency estimate from the histogram.
    pub latency_p95_ms: u64,
}

/// Snapshot returned by the performance-stats call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Live cache entries.
    pub cache_size: usize,
    /// Hits divided by lookups, or zero before the first lookup.
    pub cache_hit_rate_estimate: f64,
    /// Cache lookups served without a new backend call.
    pub cache_hits: u64,
    /// Cache lookups that dispatched to the backend.
    pub cache_misses: u64,
    /// Reads currently in flight.
    pub pending_count: usize,
    /// Rough memory held by cached results.
    pub memory_estimate_bytes: usize,
    /// Backend dispatch counters and latency.
    pub latency: LatencySnapshot,
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Mutable counters behind [`QueryStats`].
#[derive(Debug, Default)]
struct StatsState {
    /// Statements dispatched.
    query_count: u64,
    /// Failed dispatches.
    query_errors: u64,
    /// Batches dispatched.
    batch_count: u64,
    /// Latency histogram.
    histogram: [u64; LATENCY_BUCKETS_MS.len() + 1],
    /// Cumulative duration in milliseconds.
    total_duration_ms: u64,
}

/// Operation class recorded by [`QueryStats::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchKind {
    /// Single statement.
    Statement,
    /// Transactional batch.
    Batch,
}

/// Thread-safe dispatch recorder.
#[derive(Debug, Default)]
pub(crate) struct QueryStats {
    /// Guarded counters.
    state: Mutex<StatsState>,
}

impl QueryStats {
    /// Records one backend dispatch.
    pub(crate) fn record(&self, kind: DispatchKind, elapsed: Duration, failed: bool) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let index = histogram_bucket_index_from_bounds(&LATENCY_BUCKETS_MS, elapsed_ms);
        let mut state = self.lock_state();
        match kind {
            DispatchKind::Statement => state.query_count = state.query_count.saturating_add(1),
            DispatchKind::Batch => state.batch_count = state.batch_count.saturating_add(1),
        }
        if failed {
            state.query_errors = state.query_errors.saturating_add(1);
        }
        state.histogram[index] = state.histogram[index].saturating_add(1);
        state.total_duration_ms = state.total_duration_ms.saturating_add(elapsed_ms);
    }

    /// Returns a snapshot of the counters.
    pub(crate) fn snapshot(&self) -> LatencySnapshot {
        let state = self.lock_state();
        LatencySnapshot {
            query_count: state.query_count,
            query_errors: state.query_errors,
            batch_count: state.batch_count,
            latency_buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            latency_histogram: state.histogram.to_vec(),
            total_duration_ms: state.total_duration_ms,
            latency_p50_ms: histogram_percentile(&LATENCY_BUCKETS_MS, &state.histogram, 50),
            latency_p95_ms: histogram_percentile(&LATENCY_BUCKETS_MS, &state.histogram, 95),
        }
    }

    /// Locks the counters, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, StatsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Histogram Helpers
// ============================================================================

/// Returns the bucket index for `value` given inclusive upper bounds.
fn histogram_bucket_index_from_bounds(bounds: &[u64], value: u64) -> usize {
    for (idx, upper_bound) in bounds.iter().enumerate() {
        if value <= *upper_bound {
            return idx;
        }
    }
    bounds.len()
}

/// Computes approximate percentile value from bucketed histogram counts.
fn histogram_percentile(bounds: &[u64], counts: &[u64], percentile: u32) -> u64 {
    if percentile == 0 || percentile > 100 || counts.is_empty() || bounds.is_empty() {
        return 0;
    }
    let total = counts.iter().fold(0_u64, |acc, value| acc.saturating_add(*value));
    if total == 0 {
        return 0;
    }
    let rank =
        total.saturating_mul(u64::from(percentile)).saturating_add(99).saturating_div(100).max(1);
    let mut running = 0_u64;
    for (idx, count) in counts.iter().enumerate() {
        running = running.saturating_add(*count);
        if running >= rank {
            return bounds.get(idx).or_else(|| bounds.last()).copied().unwrap_or(0);
        }
    }
    bounds.last().copied().unwrap_or(0)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::DispatchKind;
    use super::LATENCY_BUCKETS_MS;
    use super::QueryStats;
    use super::histogram_bucket_index_from_bounds;
    use super::histogram_percentile;

    #[test]
    fn bucket_index_uses_inclusive_upper_bounds() {
        assert_eq!(histogram_bucket_index_from_bounds(&LATENCY_BUCKETS_MS, 0), 0);
        assert_eq!(histogram_bucket_index_from_bounds(&LATENCY_BUCKETS_MS, 5), 2);
        assert_eq!(histogram_bucket_index_from_bounds(&LATENCY_BUCKETS_MS, 6), 3);
        assert_eq!(
            histogram_bucket_index_from_bounds(&LATENCY_BUCKETS_MS, 5_000),
            LATENCY_BUCKETS_MS.len()
        );
    }

    #[test]
    fn percentile_reports_bucket_upper_bound() {
        let bounds = [1, 10, 100];
        let counts = [90, 5, 5, 0];
        assert_eq!(histogram_percentile(&bounds, &counts, 50), 1);
        assert_eq!(histogram_percentile(&bounds, &counts, 95), 10);
        assert_eq!(histogram_percentile(&bounds, &[0, 0, 0, 0], 50), 0);
    }

    #[test]
    fn overflow_percentile_saturates_at_last_bound() {
        let bounds = [1, 10];
        assert_eq!(histogram_percentile(&bounds, &[0, 0, 3], 95), 10);
    }

    #[test]
    fn record_counts_statements_batches_and_errors() {
        let stats = QueryStats::default();
        stats.record(DispatchKind::Statement, Duration::from_millis(3), false);
        stats.record(DispatchKind::Statement, Duration::from_millis(30), true);
        stats.record(DispatchKind::Batch, Duration::from_millis(1), false);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.query_count, 2);
        assert_eq!(snapshot.batch_count, 1);
        assert_eq!(snapshot.query_errors, 1);
        assert_eq!(snapshot.latency_histogram.iter().sum::<u64>(), 3);
        assert_eq!(snapshot.total_duration_ms, 34);
    }
}
