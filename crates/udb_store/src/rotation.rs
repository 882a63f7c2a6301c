//! Encryption key rotation.
//!
//! Every user blob is re-sealed under the new key inside one transaction.
//! The key swap happens under the vault's exclusive lock right before commit,
//! so readers see either all-old rows with the old key or all-new rows with
//! the new key.

use std::path::Path;

use tracing::{info, trace, warn};

use udb_crypto::EncryptionKey;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::UserRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    pub users_rotated: usize,
}

impl Store {
    /// Re-encrypt all users under `new_key` and make it the active key.
    pub async fn rotate(&self, new_key: EncryptionKey) -> Result<RotationReport, StoreError> {
        trace!("rotate");
        self.ensure_open().await?;

        // Key swaps only happen while the writer section is held, so the
        // active key cannot change until this function returns.
        let _writer = self.writer.lock().await;
        let mut tx = self.begin().await?;

        let rows: Vec<UserRow> = sqlx::query_as("SELECT id, username, blob FROM users")
            .fetch_all(&mut *tx)
            .await?;

        {
            let keys = self.vault.read().await?;
            if keys.is_active(&new_key) {
                return Err(StoreError::KeyUnchanged);
            }
            for row in &rows {
                let (plaintext, version) = keys
                    .open(&row.blob)
                    .map_err(|e| {
                        warn!(id = %row.id, "Rotation aborted: row does not open with the active key");
                        StoreError::KeyMismatch(format!("user {}: {e}", row.id))
                    })?;
                let blob = udb_crypto::seal(version, &new_key, &plaintext)?;
                sqlx::query("UPDATE users SET blob = ? WHERE id = ?")
                    .bind(&blob)
                    .bind(&row.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        // Dropping `tx` on any error below rolls the re-encryption back.
        let mut vault = self.vault.write().await.map_err(|e| {
            warn!("Rotation rolled back: store closed before the key swap");
            e
        })?;
        tx.commit().await?;
        vault.replace_key(new_key);
        drop(vault);

        let report = RotationReport {
            users_rotated: rows.len(),
        };
        info!(users = report.users_rotated, "Encryption key rotated");
        Ok(report)
    }

    /// Load a hex key file and rotate to it.
    pub async fn rotate_from_file(&self, path: &Path) -> Result<RotationReport, StoreError> {
        trace!(path = %path.display(), "rotate_from_file");
        let key = EncryptionKey::load(path)?;
        self.rotate(key).await
    }
}
