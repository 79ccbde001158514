// crates/studybank-core/src/backend.rs
// ============================================================================
// Module: Store Backend Contract
// Description: Engine-agnostic interface implemented by every store backend.
// Purpose: Let the access layer swap a real engine for the simulated one.
// Dependencies: crate::error, crate::result, serde
// ============================================================================

//! ## Overview
//! [`StoreBackend`] is the synchronous contract the access layer drives. A
//! backend executes single statements and whole batches, reports its size
//! and location, and can be closed. Calls are blocking; async callers are
//! expected to move them onto a blocking thread.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::BackendError;
use crate::result::BatchStatement;
use crate::result::QueryResult;
use crate::result::SqlValue;

// ============================================================================
// SECTION: Backend Kind
// ============================================================================

/// Concrete backend family.
///
/// # Invariants
/// - Variants are stable for diagnostics output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Real embedded `SQLite` engine.
    Sqlite,
    /// In-memory simulated backend.
    Simulated,
}

impl BackendKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Simulated => "simulated",
        }
    }
}

// ============================================================================
// SECTION: Backend Trait
// ============================================================================

/// Store backend driven by the access layer.
///
/// # Invariants
/// - `execute_batch` runs statements in order inside one transaction scope;
///   atomicity is whatever the backend provides.
/// - After `close`, every call returns [`BackendError::Closed`].
pub trait StoreBackend: Send + Sync {
    /// Returns the backend family.
    fn kind(&self) -> BackendKind;

    /// Executes one statement.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the statement fails.
    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, BackendError>;

    /// Executes statements sequentially inside one transaction scope.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Batch`] naming the failing statement.
    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), BackendError>;

    /// Closes the handle.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the engine refuses to close.
    fn close(&self) -> Result<(), BackendError>;

    /// Returns the on-disk size of the store, or zero when not file-backed.
    fn size_bytes(&self) -> u64 {
        0
    }

    /// Returns the store location when file-backed.
    fn location(&self) -> Option<PathBuf> {
        None
    }

    /// Removes on-disk artifacts, returning the paths that were removed.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when a present artifact cannot be removed.
    fn remove_artifacts(&self) -> Result<Vec<PathBuf>, BackendError> {
        Ok(Vec::new())
    }
}
