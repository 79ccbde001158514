// crates/studybank-access/src/provider.rs
// ============================================================================
// Module: Backend Providers
// Description: Factories that open the primary and fallback store backends.
// Purpose: Decouple backend selection from the initialization state machine.
// Dependencies: serde, studybank-core, studybank-store-sqlite
// ============================================================================

//! ## Overview
//! A [`BackendProvider`] opens the primary backend and, when that fails, the
//! fallback. The default fallback is the in-memory [`SimulatedStore`].
//! [`BackendSelection`] records which of the two is serving requests so that
//! degraded operation is visible through introspection, not only in logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use studybank_core::BackendError;
use studybank_core::SimulatedStore;
use studybank_core::StoreBackend;
use studybank_store_sqlite::SqliteBackend;
use studybank_store_sqlite::SqliteStoreConfig;

use crate::config::StoreSection;
use crate::config::StoreType;

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Which backend initialization settled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendSelection {
    /// The primary backend opened.
    Opened,
    /// The primary backend failed and the fallback is serving.
    Fallback {
        /// Primary open failure.
        reason: String,
    },
}

impl BackendSelection {
    /// Returns true when running on the fallback backend.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

// ============================================================================
// SECTION: Provider Trait
// ============================================================================

/// Opens store backends for the access service.
///
/// # Invariants
/// - Calls are blocking and run on a blocking thread.
/// - `open_primary` is invoked at most once per initialization.
pub trait BackendProvider: Send + Sync {
    /// Opens the primary backend.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend cannot be opened.
    fn open_primary(&self) -> Result<Arc<dyn StoreBackend>, BackendError>;

    /// Opens the fallback backend used when the primary fails.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the fallback cannot be constructed.
    fn open_fallback(&self) -> Result<Arc<dyn StoreBackend>, BackendError> {
        Ok(Arc::new(SimulatedStore::new()))
    }
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// Provider opening a `SQLite` store.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    /// Store configuration.
    config: SqliteStoreConfig,
}

impl SqliteProvider {
    /// Creates a provider for the given store configuration.
    #[must_use]
    pub const fn new(config: SqliteStoreConfig) -> Self {
        Self {
            config,
        }
    }
}

impl BackendProvider for SqliteProvider {
    fn open_primary(&self) -> Result<Arc<dyn StoreBackend>, BackendError> {
        let backend = SqliteBackend::open(self.config.clone())?;
        Ok(Arc::new(backend))
    }
}

/// Provider whose primary backend is the simulated store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedProvider;

impl BackendProvider for SimulatedProvider {
    fn open_primary(&self) -> Result<Arc<dyn StoreBackend>, BackendError> {
        Ok(Arc::new(SimulatedStore::new()))
    }
}

/// Returns the provider described by a store section.
#[must_use]
pub fn provider_for(store: &StoreSection) -> Arc<dyn BackendProvider> {
    match store.store_type {
        StoreType::Sqlite => Arc::new(SqliteProvider::new(store.sqlite_config())),
        StoreType::Simulated => Arc::new(SimulatedProvider),
    }
}
