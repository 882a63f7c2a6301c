//! Database bootstrap over SQLite via sqlx.

use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{info, trace};

use udb_crypto::EncryptionKey;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::kv;
use crate::vault::Vault;

/// Schema version this build understands. A mismatch is fatal on open.
pub const DATABASE_VERSION: u32 = 1;

/// Central store handle. Cheap to clone (Arc internally); clones share the
/// pool, the vault and the writer section.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) vault: Vault,
    /// Serializes write transactions; SQLite admits one writer at a time.
    pub(crate) writer: Arc<Mutex<()>>,
}

impl Store {
    /// Load the encryption key, open (or create) the database and verify
    /// its schema version.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        trace!(
            database = %config.database.display(),
            encryption_key = %config.encryption_key.display(),
            "Store::open"
        );
        config.validate()?;
        let key = EncryptionKey::load(&config.encryption_key)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options())
            .await?;
        info!(database = %config.database.display(), "User database connected");
        Self::connect(pool, key).await
    }

    /// Bootstrap on an existing pool with an already-loaded key.
    pub async fn connect(pool: SqlitePool, key: EncryptionKey) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let mut tx = pool.begin().await?;
        if kv::get(&mut *tx, kv::KEY_VERSION).await?.is_none() {
            kv::put(&mut *tx, kv::KEY_VERSION, &kv::encode_version(DATABASE_VERSION)).await?;
        }
        tx.commit().await?;

        let value = kv::get(&pool, kv::KEY_VERSION)
            .await?
            .ok_or_else(|| StoreError::Corrupt("missing version record".into()))?;
        let version = kv::decode_version(&value)?;
        // A version bump needs a migration; none exist yet.
        if version != DATABASE_VERSION {
            return Err(StoreError::VersionMismatch {
                got: version,
                want: DATABASE_VERSION,
            });
        }

        Ok(Self {
            pool,
            vault: Vault::new(key),
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub async fn is_shutdown(&self) -> bool {
        self.vault.is_shutdown().await
    }

    pub(crate) async fn ensure_open(&self) -> Result<(), StoreError> {
        if self.vault.is_shutdown().await {
            return Err(StoreError::Shutdown);
        }
        Ok(())
    }

    /// Check out a connection. Connections are always taken before the vault
    /// lock; a pool closed under us means the store was shut down.
    pub(crate) async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        self.pool.acquire().await.map_err(closed_as_shutdown)
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool.begin().await.map_err(closed_as_shutdown)
    }

    /// Zeroize the encryption key, reject all further work and close the
    /// pool. Only the first call succeeds.
    pub async fn close(&self) -> Result<(), StoreError> {
        trace!("close");
        self.vault.close().await?;
        self.pool.close().await;
        info!("User database closed");
        Ok(())
    }
}

fn closed_as_shutdown(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed => StoreError::Shutdown,
        other => StoreError::Database(other),
    }
}
