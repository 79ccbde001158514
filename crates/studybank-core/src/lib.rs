// crates/studybank-core/src/lib.rs
// ============================================================================
// Module: Studybank Core
// Description: Shared value types and backend contract for the access layer.
// Purpose: Keep result, error, and backend definitions independent of engines.
// Dependencies: serde, serde_json, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! `studybank-core` defines what every store backend produces and how it
//! fails: [`QueryResult`] values, the classified [`StoreError`], the lexical
//! [`StatementKind`] classifier, and the synchronous [`StoreBackend`] trait.
//! It also ships [`SimulatedStore`], the in-memory backend used when no real
//! engine can be opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod error;
pub mod result;
pub mod simulated;
pub mod statement;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use backend::BackendKind;
pub use backend::StoreBackend;
pub use error::BackendError;
pub use error::Severity;
pub use error::StoreError;
pub use error::UNKNOWN_ERROR_CODE;
pub use result::BatchStatement;
pub use result::QueryResult;
pub use result::Row;
pub use result::SqlValue;
pub use simulated::SIMULATED_SELECT_LIMIT;
pub use simulated::SimulatedStore;
pub use statement::InsertStatement;
pub use statement::InsertValue;
pub use statement::SelectStatement;
pub use statement::StatementKind;
pub use statement::is_read_only;
