//! Key-value metadata table and the paywall address index allocator.
//!
//! `version` holds the schema version (u32 LE in an 8-byte value) and
//! `paywalladdressindex` the last assigned paywall index (u64 LE).

use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::trace;

use crate::db::Store;
use crate::error::StoreError;

pub(crate) const KEY_VERSION: &str = "version";
pub(crate) const KEY_PAYWALL_ADDRESS_INDEX: &str = "paywalladdressindex";

pub(crate) async fn get<'e>(
    exec: impl SqliteExecutor<'e>,
    key: &str,
) -> Result<Option<Vec<u8>>, sqlx::Error> {
    sqlx::query_scalar("SELECT value FROM key_value WHERE key = ?")
        .bind(key)
        .fetch_optional(exec)
        .await
}

/// Upsert: at most one row per key.
pub(crate) async fn put<'e>(
    exec: impl SqliteExecutor<'e>,
    key: &str,
    value: &[u8],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO key_value (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) fn encode_version(version: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&version.to_le_bytes());
    out
}

pub(crate) fn decode_version(value: &[u8]) -> Result<u32, StoreError> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| {
        StoreError::Corrupt(format!("version record is {} bytes", value.len()))
    })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn decode_index(value: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| {
        StoreError::Corrupt(format!("paywall address index is {} bytes", value.len()))
    })?;
    Ok(u64::from_le_bytes(bytes))
}

/// Next free paywall index: 0 when none was ever stored, otherwise the stored
/// value plus one. Nothing is persisted; the caller must pair this with
/// [`set_paywall_index`] in the same transaction.
pub(crate) async fn next_paywall_index(tx: &mut SqliteConnection) -> Result<u64, StoreError> {
    match get(&mut *tx, KEY_PAYWALL_ADDRESS_INDEX).await? {
        None => Ok(0),
        Some(value) => decode_index(&value)?
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupt("paywall address index exhausted".into())),
    }
}

pub(crate) async fn set_paywall_index(tx: &mut SqliteConnection, index: u64) -> Result<(), StoreError> {
    put(&mut *tx, KEY_PAYWALL_ADDRESS_INDEX, &index.to_le_bytes()).await?;
    Ok(())
}

impl Store {
    /// Last assigned paywall address index, if any user was ever created.
    pub async fn paywall_address_index(&self) -> Result<Option<u64>, StoreError> {
        self.ensure_open().await?;
        let mut conn = self.acquire().await?;
        self.ensure_open().await?;
        get(&mut *conn, KEY_PAYWALL_ADDRESS_INDEX)
            .await?
            .map(|value| decode_index(&value))
            .transpose()
    }

    /// Overwrite the paywall address index, e.g. after migrating users in
    /// with [`Store::insert_verbatim`].
    pub async fn set_paywall_address_index(&self, index: u64) -> Result<(), StoreError> {
        trace!(index, "set_paywall_address_index");
        self.ensure_open().await?;
        let _writer = self.writer.lock().await;
        let mut conn = self.acquire().await?;
        self.ensure_open().await?;
        set_paywall_index(&mut conn, index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_u32_in_eight_bytes() {
        let encoded = encode_version(1);
        assert_eq!(encoded, [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_version(&encoded).unwrap(), 1);
        assert!(matches!(decode_version(&[1, 0]), Err(StoreError::Corrupt(_))));
        assert!(matches!(decode_version(&[1, 0, 0, 0]), Err(StoreError::Corrupt(_))));
        assert!(matches!(decode_version(&[1; 12]), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn index_is_little_endian_u64() {
        assert_eq!(decode_index(&41u64.to_le_bytes()).unwrap(), 41);
        assert!(matches!(decode_index(&[0u8; 4]), Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn allocator_starts_at_zero_and_increments() {
        let mut conn = <SqliteConnection as sqlx::Connection>::connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE key_value (key TEXT PRIMARY KEY NOT NULL, value BLOB NOT NULL)")
            .execute(&mut conn)
            .await
            .unwrap();

        assert_eq!(next_paywall_index(&mut conn).await.unwrap(), 0);
        // Allocation alone does not persist anything.
        assert_eq!(next_paywall_index(&mut conn).await.unwrap(), 0);

        set_paywall_index(&mut conn, 0).await.unwrap();
        assert_eq!(next_paywall_index(&mut conn).await.unwrap(), 1);

        set_paywall_index(&mut conn, 9).await.unwrap();
        assert_eq!(next_paywall_index(&mut conn).await.unwrap(), 10);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM key_value")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn setting_index_after_close_reports_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("userdb.key");
        udb_crypto::EncryptionKey::generate().save(&key_path).unwrap();
        let config = crate::StoreConfig::new(dir.path().join("users.db"), key_path);
        let store = Store::open(&config).await.unwrap();

        // The setter passes its gate, then queues on the writer section
        // while the store closes.
        let writer = store.writer.clone().lock_owned().await;
        let setter = {
            let store = store.clone();
            tokio::spawn(async move { store.set_paywall_address_index(5).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        store.close().await.unwrap();
        drop(writer);

        assert!(matches!(setter.await.unwrap(), Err(StoreError::Shutdown)));
        assert!(matches!(store.paywall_address_index().await, Err(StoreError::Shutdown)));
    }
}
