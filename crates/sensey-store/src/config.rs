//! Resolved storage configuration.
//!
//! The server's config loader deserializes these from its TOML file; the
//! backend factory consumes the resolved values and nothing else.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Which backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Relational,
}

/// Storage configuration: a backend kind plus the parameters for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: BackendKind,
    /// Parameters for the file backend.
    #[serde(default)]
    pub file: Option<FileConfig>,
    /// Parameters for the relational backend.
    #[serde(default)]
    pub relational: Option<RelationalConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            file: Some(FileConfig::default()),
            relational: None,
        }
    }
}

impl StorageConfig {
    /// Check that the parameters required by the selected backend are present.
    ///
    /// Construction must fail here, before any request is served, never on
    /// first use.
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            BackendKind::File => {
                let file = self
                    .file
                    .as_ref()
                    .ok_or_else(|| missing("file backend selected but [storage.file] absent"))?;
                if file.data_dir.as_os_str().is_empty() {
                    return Err(missing("storage.file.data_dir cannot be empty"));
                }
            }
            BackendKind::Relational => {
                let rel = self.relational.as_ref().ok_or_else(|| {
                    missing("relational backend selected but [storage.relational] absent")
                })?;
                if rel.host.is_empty() {
                    return Err(missing("storage.relational.host cannot be empty"));
                }
                if rel.user.is_empty() {
                    return Err(missing("storage.relational.user cannot be empty"));
                }
                if rel.database.is_empty() {
                    return Err(missing("storage.relational.database cannot be empty"));
                }
                if rel.pool_size == 0 {
                    return Err(missing("storage.relational.pool_size must be at least 1"));
                }
            }
        }
        Ok(())
    }
}

fn missing(detail: &str) -> StorageError {
    StorageError::Config(detail.to_string())
}

/// File backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Directory holding one CSV file per client.
    pub data_dir: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Relational backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalConfig {
    /// MySQL server hostname.
    pub host: String,
    /// MySQL server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database username.
    pub user: String,
    /// Database password.
    #[serde(default)]
    pub password: String,
    /// Database name.
    pub database: String,
    /// Number of connections in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How long `store`/`range_query` may wait for a pooled connection
    /// before failing with a transient error.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl RelationalConfig {
    /// The acquire timeout as a [`Duration`].
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn default_port() -> u16 {
    3306
}

fn default_pool_size() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_file_backend() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, BackendKind::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_backend_requires_section() {
        let config = StorageConfig {
            backend: BackendKind::File,
            file: None,
            relational: None,
        };
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));
    }

    #[test]
    fn test_relational_backend_requires_params() {
        let config = StorageConfig {
            backend: BackendKind::Relational,
            file: None,
            relational: None,
        };
        assert!(config.validate().is_err());

        let config = StorageConfig {
            backend: BackendKind::Relational,
            file: None,
            relational: Some(RelationalConfig {
                host: String::new(),
                port: 3306,
                user: "sensey".to_string(),
                password: String::new(),
                database: "sensey".to_string(),
                pool_size: 5,
                acquire_timeout_secs: 5,
            }),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_toml_shape() {
        let toml = r#"
            backend = "relational"

            [relational]
            host = "db.example.com"
            user = "sensey"
            password = "secret"
            database = "sensey_prod"
            pool_size = 10
        "#;
        let config: StorageConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend, BackendKind::Relational);
        let rel = config.relational.unwrap();
        assert_eq!(rel.host, "db.example.com");
        assert_eq!(rel.port, 3306);
        assert_eq!(rel.pool_size, 10);
        assert_eq!(rel.acquire_timeout_secs, 5);
    }
}
