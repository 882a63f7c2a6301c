use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User database is shut down")]
    Shutdown,

    #[error("Record not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Encryption key does not open existing data: {0}")]
    KeyMismatch(String),

    #[error("New encryption key is identical to the active key")]
    KeyUnchanged,

    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    #[error("Plugin {plugin} does not support command {command}")]
    UnsupportedCommand { plugin: String, command: String },

    #[error("Invalid plugin payload: {0}")]
    InvalidPayload(String),

    #[error("Database version mismatch: got {got}, want {want}")]
    VersionMismatch { got: u32, want: u32 },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] udb_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl StoreError {
    /// Map a UNIQUE/PRIMARY KEY violation to `Conflict`; pass anything else
    /// through as a database error.
    pub(crate) fn conflict_or_db(err: sqlx::Error, what: impl Display) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(what.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
