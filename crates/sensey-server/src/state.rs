//! Application state shared across handlers.

use std::sync::Arc;

use sensey_store::SeriesStore;

use crate::config::Config;

/// Shared application state.
///
/// The store is internally shared, so handlers clone it freely and no lock
/// sits between concurrent requests.
pub struct AppState {
    /// The configured storage backend.
    pub store: SeriesStore,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: SeriesStore, config: Config) -> Arc<Self> {
        Arc::new(Self { store, config })
    }
}
