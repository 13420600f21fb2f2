//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! AppState is the explicit application store:
//! - **Matrices**: risk & control matrices and their rows
//! - **Engagements**: each engagement owns its controls
//! - **Testing sessions**: auditor inputs per control under test
//! - **Deficiencies**: reviewer-raised records
//! - **Ad-hoc uploads**: sample uploads that unblock testing
//!
//! Engagement status and deficiency counts are never stored here; they are
//! derived from the engagement on every read.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use audit_core::{Actor, Clock, ControlId, DeficiencyId, EngagementId, MatrixId, SystemClock, Timestamp};
use audit_state::{Deficiency, Engagement, RiskControlMatrix};
use audit_testing::{
    ControlCatalog, EvidenceStore, FileNameEvidenceStore, InMemoryCatalog, TestingSession,
};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{load_catalog, AppConfig, ConfigError};

// ─── Generic In-Memory Store ─────────────────────────────────────────

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and is never held across `.await` points.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Copy + Eq + Hash, T: Clone> Store<K, T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.data.read().contains_key(id)
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &K, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(id)?;
        f(entry);
        Some(entry.clone())
    }

    /// Read-validate-update a record under one write lock.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Build and insert a record while holding the write lock, so the
    /// builder sees every existing record and nothing slips in between.
    pub fn insert_with<E>(&self, f: impl FnOnce(&[T]) -> Result<(K, T), E>) -> Result<T, E> {
        let mut guard = self.data.write();
        let existing: Vec<T> = guard.values().cloned().collect();
        let (id, value) = f(&existing)?;
        guard.insert(id, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Copy + Eq + Hash, T: Clone> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Records ─────────────────────────────────────────────────────────

/// An ad-hoc sample upload recorded against a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocUpload {
    pub file_name: String,
    pub uploaded_by: Actor,
    pub uploaded_at: Timestamp,
}

// ─── AppState ────────────────────────────────────────────────────────

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<dyn ControlCatalog>,
    pub evidence: Arc<dyn EvidenceStore + Send + Sync>,
    pub matrices: Store<MatrixId, RiskControlMatrix>,
    pub engagements: Store<EngagementId, Engagement>,
    pub sessions: Store<ControlId, TestingSession>,
    pub deficiencies: Store<DeficiencyId, Deficiency>,
    pub uploads: Store<ControlId, AdhocUpload>,
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("matrices", &self.matrices.len())
            .field("engagements", &self.engagements.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl AppState {
    /// Default configuration with an empty catalog.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Given configuration with an empty catalog. The catalog path, if
    /// any, is not read; use [`AppState::bootstrap`] for that.
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            catalog: Arc::new(InMemoryCatalog::new()),
            evidence: Arc::new(FileNameEvidenceStore),
            matrices: Store::new(),
            engagements: Store::new(),
            sessions: Store::new(),
            deficiencies: Store::new(),
            uploads: Store::new(),
            prometheus: None,
        }
    }

    /// Build state from configuration, loading the control catalog.
    pub fn bootstrap(config: AppConfig) -> Result<Self, ConfigError> {
        let catalog = match &config.catalog_path {
            Some(path) => {
                let catalog = load_catalog(path)?;
                tracing::info!(path = %path.display(), controls = catalog.len(), "control catalog loaded");
                catalog
            }
            None => {
                tracing::warn!("no control catalog configured; testing cannot start without ad-hoc uploads");
                InMemoryCatalog::new()
            }
        };
        Ok(Self::with_config(config).with_catalog(catalog))
    }

    pub fn with_catalog(mut self, catalog: impl ControlCatalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_evidence_store(mut self, store: impl EvidenceStore + Send + Sync + 'static) -> Self {
        self.evidence = Arc::new(store);
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
