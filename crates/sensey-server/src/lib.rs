//! Sensey collector - HTTP ingest and query API.
//!
//! The server accepts readings posted by clients, persists them through the
//! configured [`sensey_store::SeriesStore`] backend, and serves time-windowed
//! queries for the dashboard. Storage is verified at startup; a server that
//! begins accepting requests is known to be able to persist them.

pub mod api;
pub mod config;
pub mod state;

pub use config::{Config, ConfigError};
pub use state::AppState;
