// crates/studybank-access/src/lib.rs
// ============================================================================
// Module: Studybank Access
// Description: Data-store access layer over SQLite with a simulated fallback.
// Purpose: Expose the access service, its cache, and its configuration.
// Dependencies: studybank-core, studybank-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! The access layer opens the local store on first use, falls back to an
//! in-memory simulation when the store cannot be opened, caches read
//! results for a bounded time, collapses identical concurrent reads, runs
//! transactional batches, and sweeps its cache in the background.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod cache;
mod config;
mod maintenance;
mod provider;
mod service;
mod stats;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use cache::QueryCache;
pub use cache::statement_key;
pub use config::AccessConfig;
pub use config::CacheConfig;
pub use config::ConfigError;
pub use config::MaintenanceConfig;
pub use config::StoreSection;
pub use config::StoreType;
pub use config::TuningConfig;
pub use provider::BackendProvider;
pub use provider::BackendSelection;
pub use provider::SimulatedProvider;
pub use provider::SqliteProvider;
pub use provider::provider_for;
pub use service::AccessService;
pub use service::BatchOutcome;
pub use service::CacheMode;
pub use service::MaintenanceReport;
pub use service::ResetReport;
pub use service::ServiceState;
pub use service::StoreDescriptor;
pub use stats::LatencySnapshot;
pub use stats::PerformanceStats;
