//! Database row models and their conversion to and from the `User` aggregate.
//!
//! The storage columns are kept separate from the in-memory aggregate; the
//! only way between the two is through [`UserRow::seal`] and
//! [`UserRow::open`], which go through the vault's active key.

use sqlx::SqliteConnection;
use zeroize::Zeroizing;

use udb_proto::{Identity, User, VERSION_USER};

use crate::error::StoreError;
use crate::vault::KeyGuard;

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub username: String,
    /// Sealed JSON of the full `User` aggregate.
    pub blob: Vec<u8>,
}

impl UserRow {
    pub fn seal(user: &User, keys: &KeyGuard<'_>) -> Result<Self, StoreError> {
        let plaintext = Zeroizing::new(user.encode()?);
        Ok(Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            blob: keys.seal(VERSION_USER, &plaintext)?,
        })
    }

    /// Decrypt and decode the row. Any failure is `Corrupt`; error text never
    /// carries plaintext.
    pub fn open(&self, keys: &KeyGuard<'_>) -> Result<User, StoreError> {
        let (plaintext, _version) = keys
            .open(&self.blob)
            .map_err(|e| StoreError::Corrupt(format!("user {}: {e}", self.id)))?;
        let user = User::decode(&plaintext).map_err(|e| {
            StoreError::Corrupt(format!(
                "user {}: undecodable aggregate at line {} column {}",
                self.id,
                e.line(),
                e.column()
            ))
        })?;
        if user.id.to_string() != self.id {
            return Err(StoreError::Corrupt(format!(
                "user {}: blob belongs to another record",
                self.id
            )));
        }
        Ok(user)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IdentityRow {
    pub public_key: String,
    pub user_id: String,
    pub activated: i64,
    pub deactivated: i64,
}

impl IdentityRow {
    fn from_identity(user: &User, identity: &Identity) -> Self {
        Self {
            public_key: identity.public_key(),
            user_id: user.id.to_string(),
            activated: identity.activated,
            deactivated: identity.deactivated,
        }
    }
}

pub(crate) async fn insert_user(conn: &mut SqliteConnection, row: &UserRow) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO users (id, username, blob) VALUES (?, ?, ?)")
        .bind(&row.id)
        .bind(&row.username)
        .bind(&row.blob)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::conflict_or_db(e, format!("user {} or username {} exists", row.id, row.username))
        })?;
    Ok(())
}

/// Bring the identity side table in line with `user.identities`. Rows are
/// only added or updated, never removed, so the whole history stays
/// resolvable. A key owned by another user is a `Conflict`.
pub(crate) async fn sync_identities(conn: &mut SqliteConnection, user: &User) -> Result<(), StoreError> {
    for identity in &user.identities {
        let row = IdentityRow::from_identity(user, identity);
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM identities WHERE public_key = ?")
                .bind(&row.public_key)
                .fetch_optional(&mut *conn)
                .await?;

        match owner {
            Some(owner) if owner != row.user_id => {
                return Err(StoreError::Conflict(format!(
                    "public key {} belongs to another user",
                    row.public_key
                )));
            }
            Some(_) => {
                sqlx::query(
                    "UPDATE identities SET activated = ?, deactivated = ? WHERE public_key = ?",
                )
                .bind(row.activated)
                .bind(row.deactivated)
                .bind(&row.public_key)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO identities (public_key, user_id, activated, deactivated) VALUES (?, ?, ?, ?)",
                )
                .bind(&row.public_key)
                .bind(&row.user_id)
                .bind(row.activated)
                .bind(row.deactivated)
                .execute(&mut *conn)
                .await?;
            }
        }
    }
    Ok(())
}
