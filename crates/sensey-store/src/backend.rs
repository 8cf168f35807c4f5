//! Backend selection and the uniform store interface.

use tracing::info;

use sensey_types::{Reading, TimeWindow};

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StorageError};
use crate::file::FileSeriesStore;
use crate::relational::RelationalSeriesStore;

/// A series store backed by either local files or MySQL.
///
/// All callers go through this type; which backend sits behind it is purely
/// a configuration decision. Cloning is cheap and shares the backend.
#[derive(Clone)]
pub enum SeriesStore {
    File(FileSeriesStore),
    Relational(RelationalSeriesStore),
}

impl SeriesStore {
    /// Construct the configured backend, failing fast on anything wrong:
    /// invalid config, an unwritable data directory, or an unreachable
    /// database. A store that connects is ready to serve.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        config.validate()?;

        match config.backend {
            BackendKind::File => {
                let file_config = config
                    .file
                    .as_ref()
                    .ok_or_else(|| StorageError::Config("missing [storage.file]".to_string()))?;
                let store = FileSeriesStore::open(file_config)?;
                info!("Using file storage backend");
                Ok(SeriesStore::File(store))
            }
            BackendKind::Relational => {
                let rel_config = config.relational.as_ref().ok_or_else(|| {
                    StorageError::Config("missing [storage.relational]".to_string())
                })?;
                let store = RelationalSeriesStore::connect(rel_config).await?;
                info!("Using relational storage backend");
                Ok(SeriesStore::Relational(store))
            }
        }
    }

    /// Persist one reading.
    pub async fn store(&self, reading: &Reading) -> Result<()> {
        match self {
            SeriesStore::File(store) => store.store(reading),
            SeriesStore::Relational(store) => store.store(reading).await,
        }
    }

    /// The `n` most recent readings for a client, newest first. Unknown
    /// clients yield an empty vector.
    pub async fn latest(&self, client_id: &str, n: usize) -> Result<Vec<Reading>> {
        match self {
            SeriesStore::File(store) => store.latest(client_id, n),
            SeriesStore::Relational(store) => store.latest(client_id, n).await,
        }
    }

    /// All readings for a client within the window, ascending by timestamp.
    pub async fn range_query(&self, client_id: &str, window: TimeWindow) -> Result<Vec<Reading>> {
        let mut series = match self {
            SeriesStore::File(store) => store.range_query(client_id, window)?,
            SeriesStore::Relational(store) => store.range_query(client_id, window).await?,
        };
        // Both backends already order ascending; enforce it here so callers
        // can rely on it no matter the backend.
        series.sort_by_key(|r| r.timestamp);
        Ok(series)
    }

    /// Clients with at least one stored reading, sorted.
    pub async fn list_clients(&self) -> Result<Vec<String>> {
        match self {
            SeriesStore::File(store) => store.list_clients(),
            SeriesStore::Relational(store) => store.list_clients().await,
        }
    }

    /// Verify the backend is still able to serve.
    pub async fn health_check(&self) -> Result<()> {
        match self {
            SeriesStore::File(store) => store.health_check(),
            SeriesStore::Relational(store) => store.health_check().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, RelationalConfig};

    #[tokio::test]
    async fn test_connect_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: BackendKind::File,
            file: Some(FileConfig {
                data_dir: dir.path().join("series"),
            }),
            relational: None,
        };

        let store = SeriesStore::connect(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(store.list_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = StorageConfig {
            backend: BackendKind::Relational,
            file: None,
            relational: None,
        };
        assert!(matches!(
            SeriesStore::connect(&config).await,
            Err(StorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_unreachable_database() {
        let config = StorageConfig {
            backend: BackendKind::Relational,
            file: None,
            relational: Some(RelationalConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                user: "sensey".to_string(),
                password: String::new(),
                database: "sensey".to_string(),
                pool_size: 1,
                acquire_timeout_secs: 1,
            }),
        };
        assert!(SeriesStore::connect(&config).await.is_err());
    }
}
