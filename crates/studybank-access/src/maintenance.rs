// crates/studybank-access/src/maintenance.rs
// ============================================================================
// Module: Background Maintenance
// Description: Periodic cache maintenance loop.
// Purpose: Sweep expired cache entries on a fixed interval.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! The maintenance loop ticks on a fixed interval and runs one maintenance
//! pass per tick. It holds only a weak reference to the service, so it
//! exits on the first tick after the last service handle is dropped. Each
//! pass takes the cache lock once per step; a slow tick is delayed, never
//! burst.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio::time::interval_at;
use tracing::debug;

use crate::service::ServiceInner;

// ============================================================================
// SECTION: Loop
// ============================================================================

/// Spawns the maintenance loop for `inner`.
pub(crate) fn spawn_maintenance_loop(inner: Weak<ServiceInner>, period: Duration) {
    let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
    debug!(period_ms, "maintenance loop started");
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                debug!("access service dropped; maintenance loop exiting");
                break;
            };
            let report = inner.run_maintenance();
            if report.expired_evicted > 0 {
                debug!(expired = report.expired_evicted, "maintenance evicted expired entries");
            }
        }
    });
}
