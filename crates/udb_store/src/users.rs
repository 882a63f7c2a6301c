//! User record operations.

use std::collections::{HashMap, HashSet};

use futures_util::TryStreamExt;
use sqlx::{QueryBuilder, Sqlite};
use tracing::trace;
use uuid::Uuid;

use udb_proto::User;

use crate::db::Store;
use crate::error::StoreError;
use crate::kv;
use crate::models::{insert_user, sync_identities, UserRow};

/// SQLite caps bound parameters per statement; batch lookups are split.
const LOOKUP_CHUNK: usize = 500;

impl Store {
    /// Insert a new user. The id and paywall address index are assigned here;
    /// whatever the caller put in those fields is overwritten.
    pub async fn create(&self, mut user: User) -> Result<Uuid, StoreError> {
        trace!(username = %user.username, "create");
        self.ensure_open().await?;

        let _writer = self.writer.lock().await;
        let mut tx = self.begin().await?;
        let keys = self.vault.read().await?;

        let index = kv::next_paywall_index(&mut tx).await?;
        user.id = Uuid::new_v4();
        user.paywall_address_index = index;

        let row = UserRow::seal(&user, &keys)?;
        insert_user(&mut tx, &row).await?;
        sync_identities(&mut tx, &user).await?;
        kv::set_paywall_index(&mut tx, index).await?;
        tx.commit().await?;

        trace!(id = %user.id, index, "create: committed");
        Ok(user.id)
    }

    /// Insert a user exactly as given, keeping its id and paywall index.
    /// The paywall counter is left alone; see
    /// [`Store::set_paywall_address_index`].
    pub async fn insert_verbatim(&self, user: &User) -> Result<(), StoreError> {
        trace!(id = %user.id, username = %user.username, "insert_verbatim");
        self.ensure_open().await?;

        let _writer = self.writer.lock().await;
        let mut tx = self.begin().await?;
        let keys = self.vault.read().await?;

        let row = UserRow::seal(user, &keys)?;
        insert_user(&mut tx, &row).await?;
        sync_identities(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the stored record with `user`, matched by id.
    pub async fn update(&self, user: &User) -> Result<(), StoreError> {
        trace!(id = %user.id, "update");
        self.ensure_open().await?;

        let _writer = self.writer.lock().await;
        let mut tx = self.begin().await?;
        let keys = self.vault.read().await?;

        let row = UserRow::seal(user, &keys)?;
        let result = sqlx::query("UPDATE users SET username = ?, blob = ? WHERE id = ?")
            .bind(&row.username)
            .bind(&row.blob)
            .bind(&row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::conflict_or_db(e, format!("username {} exists", row.username)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        sync_identities(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        trace!(username, "get_by_username");
        self.ensure_open().await?;

        let mut conn = self.acquire().await?;
        let keys = self.vault.read().await?;
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, blob FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&mut *conn)
                .await?;
        row.ok_or(StoreError::NotFound)?.open(&keys)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        trace!(%id, "get_by_id");
        self.ensure_open().await?;

        let mut conn = self.acquire().await?;
        let keys = self.vault.read().await?;
        let row: Option<UserRow> = sqlx::query_as("SELECT id, username, blob FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        row.ok_or(StoreError::NotFound)?.open(&keys)
    }

    /// Look up the owner of a hex-encoded public key. Deactivated identities
    /// still resolve to their user.
    pub async fn get_by_public_key(&self, public_key: &str) -> Result<User, StoreError> {
        trace!(public_key, "get_by_public_key");
        self.ensure_open().await?;

        let mut conn = self.acquire().await?;
        let keys = self.vault.read().await?;
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT u.id, u.username, u.blob FROM users u \
             JOIN identities i ON i.user_id = u.id \
             WHERE i.public_key = ?",
        )
        .bind(public_key)
        .fetch_optional(&mut *conn)
        .await?;
        row.ok_or(StoreError::NotFound)?.open(&keys)
    }

    /// Batch lookup by public key. Keys with no owner are simply absent from
    /// the result. Each matched user is decrypted once and entered under
    /// every one of its identities that was asked for.
    pub async fn get_many_by_public_keys<I, S>(&self, public_keys: I) -> Result<HashMap<String, User>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open().await?;

        let requested: HashSet<String> = public_keys
            .into_iter()
            .map(|key| key.as_ref().to_owned())
            .collect();
        trace!(count = requested.len(), "get_many_by_public_keys");
        if requested.is_empty() {
            return Ok(HashMap::new());
        }

        let wanted: Vec<&String> = requested.iter().collect();
        let mut conn = self.acquire().await?;
        let keys = self.vault.read().await?;
        let mut seen = HashSet::new();
        let mut found = HashMap::new();

        for chunk in wanted.chunks(LOOKUP_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT DISTINCT u.id, u.username, u.blob FROM users u \
                 JOIN identities i ON i.user_id = u.id \
                 WHERE i.public_key IN (",
            );
            let mut list = query.separated(", ");
            for key in chunk {
                list.push_bind((*key).clone());
            }
            list.push_unseparated(")");

            let rows: Vec<UserRow> = query.build_query_as().fetch_all(&mut *conn).await?;
            for row in rows {
                if !seen.insert(row.id.clone()) {
                    continue;
                }
                let user = row.open(&keys)?;
                for identity in &user.identities {
                    let public_key = identity.public_key();
                    if requested.contains(&public_key) {
                        found.insert(public_key, user.clone());
                    }
                }
            }
        }
        Ok(found)
    }

    /// Decrypt every user in turn and hand it to `callback`. Rows are
    /// streamed; a decryption failure stops the scan.
    pub async fn for_each<F>(&self, mut callback: F) -> Result<(), StoreError>
    where
        F: FnMut(User),
    {
        trace!("for_each");
        self.ensure_open().await?;

        let mut conn = self.acquire().await?;
        let keys = self.vault.read().await?;
        let mut rows = sqlx::query_as::<_, UserRow>("SELECT id, username, blob FROM users").fetch(&mut *conn);
        while let Some(row) = rows.try_next().await? {
            callback(row.open(&keys)?);
        }
        Ok(())
    }

    pub async fn count_users(&self) -> Result<u64, StoreError> {
        self.ensure_open().await?;
        let mut conn = self.acquire().await?;
        self.ensure_open().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *conn)
            .await?;
        Ok(count as u64)
    }
}
