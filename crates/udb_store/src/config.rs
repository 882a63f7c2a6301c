//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

use crate::error::StoreError;

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; created if missing.
    pub database: PathBuf,
    /// File holding the hex-encoded 32-byte encryption key.
    pub encryption_key: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(database: impl Into<PathBuf>, encryption_key: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            encryption_key: encryption_key.into(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path)
            .map_err(|e| StoreError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_connections == 0 {
            return Err(StoreError::Config("max_connections must be at least 1".into()));
        }
        Ok(())
    }

    /// WAL journal mode and foreign-key enforcement are set per connection,
    /// not inside the schema transaction.
    pub fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.database)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}
