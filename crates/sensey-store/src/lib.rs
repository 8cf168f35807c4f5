//! Storage backends for Sensey sensor readings.
//!
//! This crate provides a uniform interface over two persistence backends:
//!
//! - [`FileSeriesStore`]: one append-only CSV file per client, suitable for
//!   small deployments with no external services
//! - [`RelationalSeriesStore`]: MySQL with a hybrid schema (fixed columns for
//!   the canonical measurements, a JSON column for everything else)
//!
//! Both agree on semantics for storing readings, enumerating clients,
//! latest-value retrieval, and time-windowed range queries: given the same
//! stored data, a range query returns field-identical results from either.
//!
//! # Example
//!
//! ```no_run
//! use sensey_store::{SeriesStore, StorageConfig};
//! use sensey_types::{Reading, TimeWindow};
//!
//! # async fn example(config: StorageConfig) -> Result<(), sensey_store::StorageError> {
//! let store = SeriesStore::connect(&config).await?;
//!
//! let reading = Reading::now("greenhouse-1").with_field("temperature", 21.5);
//! store.store(&reading).await?;
//!
//! let recent = store.range_query("greenhouse-1", TimeWindow::OneHour).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod error;
mod file;
mod relational;

pub use backend::SeriesStore;
pub use config::{BackendKind, FileConfig, RelationalConfig, StorageConfig};
pub use error::{Result, StorageError};
pub use file::FileSeriesStore;
pub use relational::RelationalSeriesStore;
