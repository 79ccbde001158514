// crates/studybank-store-sqlite/src/lib.rs
// ============================================================================
// Module: Studybank SQLite Store
// Description: SQLite-backed implementation of the Studybank store backend.
// Purpose: Provide the real embedded engine behind the access layer.
// Dependencies: rusqlite, serde, studybank-core, thiserror, tracing
// ============================================================================

//! ## Overview
//! This crate implements [`studybank_core::StoreBackend`] on top of `SQLite`
//! through `rusqlite`. See [`SqliteBackend`].

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use store::SqliteBackend;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::artifact_paths;
