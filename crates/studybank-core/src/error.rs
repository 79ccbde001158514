// crates/studybank-core/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Backend-level errors and the classified caller-facing error.
// Purpose: Attach severity and diagnostic context to every store failure.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Backends fail with [`BackendError`], a small `thiserror` enum carrying the
//! engine code. The access layer converts those into [`StoreError`], which
//! adds a [`Severity`], a derived recoverability flag, and a free-form
//! context map (timestamp, cause, statement, parameters).
//!
//! Severity classes:
//! - `Critical`: no backend could be opened in any form.
//! - `High`: a statement, batch, or transaction failed.
//! - `Medium`: maintenance, statistics, or tuning work failed.
//! - `Low`: advisory only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Error code used when the originating failure carries no backend code.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Coarse impact classification of a store failure.
///
/// # Invariants
/// - Ordering follows impact: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Advisory condition.
    Low,
    /// Maintenance-class failure; queries are unaffected.
    Medium,
    /// Statement-level failure; retryable.
    High,
    /// No usable backend.
    Critical,
}

impl Severity {
    /// Returns a stable label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Returns true unless the severity is [`Severity::Critical`].
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        !matches!(self, Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Backend Errors
// ============================================================================

/// Errors raised by a [`crate::StoreBackend`] implementation.
///
/// # Invariants
/// - Messages never embed parameter values; those are attached by the
///   access layer as structured context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Filesystem or handle error.
    #[error("store backend io error: {0}")]
    Io(String),
    /// Engine reported an error with its own code.
    #[error("store backend engine error ({code}): {message}")]
    Engine {
        /// Engine-specific error code.
        code: String,
        /// Engine error message.
        message: String,
    },
    /// Statement could not be executed as written.
    #[error("store backend rejected statement: {0}")]
    Statement(String),
    /// Backend handle was closed.
    #[error("store backend closed")]
    Closed,
    /// Backend could not be opened.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    /// A statement inside a batch failed.
    #[error("batch statement {index} failed: {source}")]
    Batch {
        /// Zero-based index of the failing statement.
        index: usize,
        /// Underlying failure.
        source: Box<BackendError>,
    },
}

impl BackendError {
    /// Returns the backend-specific code for the failure.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Io(_) => "IO",
            Self::Engine {
                code, ..
            } => code,
            Self::Statement(_) => "STATEMENT",
            Self::Closed => "CLOSED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Batch {
                source, ..
            } => source.code(),
        }
    }

    /// Returns the failing batch index, when the error came from a batch.
    #[must_use]
    pub const fn batch_index(&self) -> Option<usize> {
        match self {
            Self::Batch {
                index, ..
            } => Some(*index),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Store Error
// ============================================================================

/// Classified failure returned to callers of the access layer.
///
/// # Invariants
/// - Constructed at the point of failure and never mutated afterwards.
/// - `context` always holds `timestamp` and `cause`.
/// - `recoverable()` is derived from `severity`.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message} [{code}, {severity}]")]
pub struct StoreError {
    /// Human-readable summary.
    message: String,
    /// Backend code or [`UNKNOWN_ERROR_CODE`].
    code: String,
    /// Impact classification.
    severity: Severity,
    /// Structured diagnostic context.
    context: BTreeMap<String, Value>,
}

impl StoreError {
    /// Builds a classified error, stamping the timestamp and cause.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        code: impl Into<String>,
        severity: Severity,
        cause: &str,
    ) -> Self {
        let mut context = BTreeMap::new();
        context.insert("timestamp".to_string(), Value::String(now_rfc3339()));
        context.insert("cause".to_string(), Value::String(cause.to_string()));
        Self {
            message: message.into(),
            code: code.into(),
            severity,
            context,
        }
    }

    /// Classifies a backend failure.
    #[must_use]
    pub fn from_backend(message: impl Into<String>, severity: Severity, error: &BackendError) -> Self {
        let store_error = Self::new(message, error.code(), severity, &error.to_string());
        match error.batch_index() {
            Some(index) => store_error.with_context("batch_index", index),
            None => store_error,
        }
    }

    /// Builds an error with the [`UNKNOWN_ERROR_CODE`] code.
    #[must_use]
    pub fn unknown(message: impl Into<String>, severity: Severity, cause: &str) -> Self {
        Self::new(message, UNKNOWN_ERROR_CODE, severity, cause)
    }

    /// Returns a copy with an extra context entry.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Returns the summary message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns true unless the error is [`Severity::Critical`].
    #[must_use]
    pub const fn recoverable(&self) -> bool {
        self.severity.is_recoverable()
    }

    /// Returns the full diagnostic context.
    #[must_use]
    pub const fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// Returns one context entry.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

/// Returns the current UTC time as RFC 3339 text.
fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::BackendError;
    use super::Severity;
    use super::StoreError;

    #[test]
    fn recoverable_is_derived_from_severity() {
        let high = StoreError::unknown("statement failed", Severity::High, "boom");
        let critical = StoreError::unknown("no backend", Severity::Critical, "boom");
        assert!(high.recoverable());
        assert!(!critical.recoverable());
    }

    #[test]
    fn context_carries_timestamp_and_cause() {
        let error = StoreError::unknown("statement failed", Severity::Medium, "disk full");
        assert!(error.context_value("timestamp").is_some());
        assert_eq!(error.context_value("cause"), Some(&serde_json::json!("disk full")));
    }

    #[test]
    fn batch_errors_keep_inner_code_and_index() {
        let error = BackendError::Batch {
            index: 2,
            source: Box::new(BackendError::Engine {
                code: "SQLITE_CONSTRAINT".to_string(),
                message: "UNIQUE constraint failed".to_string(),
            }),
        };
        let classified = StoreError::from_backend("batch failed", Severity::High, &error);
        assert_eq!(classified.code(), "SQLITE_CONSTRAINT");
        assert_eq!(classified.context_value("batch_index"), Some(&serde_json::json!(2)));
    }
}
