//! Decred plugin handler.
//!
//! Mutations are appended to `decred_journal` keyed by proposal token;
//! queries answer from the journaled payloads of the mutations they read.
//! Payloads stay opaque apart from an optional top-level `"token"` string
//! and, for `censorcomment`, the `"commentid"` naming the censored entry.
//! A comment's id is the `seq` its `newcomment` was journaled under.

use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tracing::{debug, trace};

use udb_proto::decred::{self, DecredCommand};

use crate::db::Store;
use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS decred_journal (
        seq     INTEGER PRIMARY KEY AUTOINCREMENT,
        token   TEXT NOT NULL,
        command TEXT NOT NULL,
        payload TEXT NOT NULL,
        target  INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS decred_journal_token ON decred_journal(token, command)",
];

// Censored comments are hidden from every query.
const SELECT_PAYLOADS: &str = "SELECT payload FROM decred_journal \
     WHERE token = ? AND command = ? \
     AND seq NOT IN (SELECT target FROM decred_journal WHERE command = 'censorcomment' AND target IS NOT NULL) \
     ORDER BY seq";
const SELECT_LATEST: &str = "SELECT payload FROM decred_journal \
     WHERE token = ? AND command = ? \
     AND seq NOT IN (SELECT target FROM decred_journal WHERE command = 'censorcomment' AND target IS NOT NULL) \
     ORDER BY seq DESC LIMIT 1";
const COUNT_PAYLOADS: &str = "SELECT COUNT(*) FROM decred_journal \
     WHERE token = ? AND command = ? \
     AND seq NOT IN (SELECT target FROM decred_journal WHERE command = 'censorcomment' AND target IS NOT NULL)";

pub(super) async fn setup(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

fn unsupported(command: &str) -> StoreError {
    StoreError::UnsupportedCommand {
        plugin: decred::ID.to_owned(),
        command: command.to_owned(),
    }
}

fn parse_payload(payload: &str) -> Result<Value, StoreError> {
    serde_json::from_str(payload).map_err(|e| StoreError::InvalidPayload(format!("not JSON: {e}")))
}

/// The payload's `"token"`, if any.
fn token_of(payload: &Value) -> Result<Option<String>, StoreError> {
    match payload.get("token") {
        None => Ok(None),
        Some(Value::String(token)) => Ok(Some(token.clone())),
        Some(_) => Err(StoreError::InvalidPayload("token must be a string".into())),
    }
}

fn require_token(command: DecredCommand, payload: &Value) -> Result<String, StoreError> {
    token_of(payload)?
        .filter(|token| !token.is_empty())
        .ok_or_else(|| StoreError::InvalidPayload(format!("{command} needs a token")))
}

/// `"commentid"` as a number or a numeric string.
fn comment_id(payload: &Value) -> Result<i64, StoreError> {
    let id = match payload.get("commentid") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    id.filter(|id| *id > 0)
        .ok_or_else(|| StoreError::InvalidPayload("censorcomment needs a numeric commentid".into()))
}

pub(super) async fn exec(store: &Store, command: &str, payload: &str) -> Result<String, StoreError> {
    let cmd: DecredCommand = command.parse().map_err(|_| unsupported(command))?;
    trace!(command = %cmd, "decred exec");

    if cmd == DecredCommand::BestBlock {
        // No chain view at this layer.
        return Err(unsupported(command));
    }
    let payload_value = parse_payload(payload)?;
    if cmd.is_mutation() {
        return journal(store, cmd, payload, &payload_value).await;
    }

    let mut conn = store.acquire().await?;
    store.ensure_open().await?;

    match cmd {
        DecredCommand::Inventory | DecredCommand::TokenInventory => inventory(&mut conn).await,
        DecredCommand::GetNumComments => {
            let token = require_token(cmd, &payload_value)?;
            let count: i64 = sqlx::query_scalar(COUNT_PAYLOADS)
                .bind(&token)
                .bind(DecredCommand::NewComment.as_str())
                .fetch_one(&mut *conn)
                .await?;
            Ok(json!({ "numcomments": count }).to_string())
        }
        DecredCommand::GetComment => {
            let token = require_token(cmd, &payload_value)?;
            let latest: Option<String> = sqlx::query_scalar(SELECT_LATEST)
                .bind(&token)
                .bind(DecredCommand::NewComment.as_str())
                .fetch_optional(&mut *conn)
                .await?;
            latest.ok_or(StoreError::NotFound)
        }
        _ => {
            let token = require_token(cmd, &payload_value)?;
            let mut entries = Vec::new();
            for source in cmd.sources() {
                let payloads: Vec<String> = sqlx::query_scalar(SELECT_PAYLOADS)
                    .bind(&token)
                    .bind(source.as_str())
                    .fetch_all(&mut *conn)
                    .await?;
                for entry in payloads {
                    entries.push(serde_json::from_str::<Value>(&entry)?);
                }
            }
            Ok(Value::Array(entries).to_string())
        }
    }
}

async fn journal(
    store: &Store,
    cmd: DecredCommand,
    payload: &str,
    payload_value: &Value,
) -> Result<String, StoreError> {
    let (token, target) = if cmd == DecredCommand::CensorComment {
        (require_token(cmd, payload_value)?, Some(comment_id(payload_value)?))
    } else {
        (token_of(payload_value)?.unwrap_or_default(), None)
    };

    let _writer = store.writer.lock().await;
    let mut conn = store.acquire().await?;
    store.ensure_open().await?;

    if let Some(target) = target {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT seq FROM decred_journal WHERE seq = ? AND token = ? AND command = ?",
        )
        .bind(target)
        .bind(&token)
        .bind(DecredCommand::NewComment.as_str())
        .fetch_optional(&mut *conn)
        .await?;
        if exists.is_none() {
            debug!(%token, target, "censorcomment names no comment");
            return Err(StoreError::NotFound);
        }
    }

    let seq = sqlx::query(
        "INSERT INTO decred_journal (token, command, payload, target) VALUES (?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(cmd.as_str())
    .bind(payload)
    .bind(target)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(json!({ "seq": seq }).to_string())
}

async fn inventory(conn: &mut SqliteConnection) -> Result<String, StoreError> {
    let tokens: Vec<String> = sqlx::query_scalar(
        "SELECT token FROM decred_journal WHERE token != '' GROUP BY token ORDER BY MIN(seq)",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(json!({ "tokens": tokens }).to_string())
}

#[cfg(test)]
mod tests {
    use udb_crypto::EncryptionKey;
    use udb_proto::{PluginCommand, PluginRegistration};

    use super::*;
    use crate::config::StoreConfig;

    async fn registered_store(dir: &tempfile::TempDir) -> Store {
        let key_path = dir.path().join("userdb.key");
        EncryptionKey::generate().save(&key_path).unwrap();
        let store = Store::open(&StoreConfig::new(dir.path().join("users.db"), key_path))
            .await
            .unwrap();
        store
            .register_plugin(PluginRegistration {
                id: decred::ID.into(),
                version: decred::VERSION.into(),
                settings: vec![],
            })
            .await
            .unwrap();
        store
    }

    async fn run(store: &Store, command: &str, payload: Value) -> Result<Value, StoreError> {
        let reply = store
            .exec(PluginCommand {
                id: decred::ID.into(),
                command: command.into(),
                payload: payload.to_string(),
            })
            .await?;
        Ok(serde_json::from_str(&reply.payload).unwrap())
    }

    #[tokio::test]
    async fn mutations_are_journaled_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = registered_store(&dir).await;

        let first = run(&store, "authorizevote", json!({"token": "abc", "action": "authorize"}))
            .await
            .unwrap();
        let second = run(&store, "startvote", json!({"token": "abc", "duration": 2016}))
            .await
            .unwrap();
        assert_eq!(first, json!({"seq": 1}));
        assert_eq!(second, json!({"seq": 2}));

        let details = run(&store, "votedetails", json!({"token": "abc"})).await.unwrap();
        assert_eq!(
            details,
            json!([
                {"token": "abc", "action": "authorize"},
                {"token": "abc", "duration": 2016}
            ])
        );
    }

    #[tokio::test]
    async fn comment_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = registered_store(&dir).await;

        for text in ["one", "two"] {
            run(&store, "newcomment", json!({"token": "t1", "comment": text}))
                .await
                .unwrap();
        }
        run(&store, "newcomment", json!({"token": "t2", "comment": "other"}))
            .await
            .unwrap();

        assert_eq!(
            run(&store, "getnumcomments", json!({"token": "t1"})).await.unwrap(),
            json!({"numcomments": 2})
        );
        assert_eq!(
            run(&store, "getcomment", json!({"token": "t1"})).await.unwrap(),
            json!({"token": "t1", "comment": "two"})
        );
        assert_eq!(
            run(&store, "getcomments", json!({"token": "t2"})).await.unwrap(),
            json!([{"token": "t2", "comment": "other"}])
        );
        assert!(matches!(
            run(&store, "getcomment", json!({"token": "t3"})).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(
            run(&store, "tokeninventory", json!({})).await.unwrap(),
            json!({"tokens": ["t1", "t2"]})
        );
    }

    #[tokio::test]
    async fn bad_commands_and_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = registered_store(&dir).await;

        assert!(matches!(
            run(&store, "frobnicate", json!({})).await,
            Err(StoreError::UnsupportedCommand { command, .. }) if command == "frobnicate"
        ));
        assert!(matches!(
            run(&store, "bestblock", json!({})).await,
            Err(StoreError::UnsupportedCommand { .. })
        ));
        assert!(matches!(
            run(&store, "votesummary", json!({})).await,
            Err(StoreError::InvalidPayload(_))
        ));
        assert!(matches!(
            run(&store, "ballot", json!({"token": 7})).await,
            Err(StoreError::InvalidPayload(_))
        ));

        let err = store
            .exec(PluginCommand {
                id: decred::ID.into(),
                command: "ballot".into(),
                payload: "not json".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }

    #[test]
    fn token_is_optional_but_typed() {
        assert_eq!(token_of(&json!({"token": "x"})).unwrap(), Some("x".into()));
        assert_eq!(token_of(&json!({})).unwrap(), None);
        assert!(token_of(&json!([1, 2])).is_ok());
        assert!(token_of(&json!({"token": null})).is_err());
    }

    #[test]
    fn comment_id_accepts_number_or_numeric_string() {
        assert_eq!(comment_id(&json!({"commentid": 3})).unwrap(), 3);
        assert_eq!(comment_id(&json!({"commentid": "12"})).unwrap(), 12);
        assert!(comment_id(&json!({"commentid": "x"})).is_err());
        assert!(comment_id(&json!({"commentid": 0})).is_err());
        assert!(comment_id(&json!({})).is_err());
    }

    #[tokio::test]
    async fn censored_comments_are_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let store = registered_store(&dir).await;

        let mut ids = Vec::new();
        for text in ["keep", "drop", "last"] {
            let reply = run(&store, "newcomment", json!({"token": "t1", "comment": text}))
                .await
                .unwrap();
            ids.push(reply["seq"].as_i64().unwrap());
        }

        run(&store, "censorcomment", json!({"token": "t1", "commentid": ids[1].to_string()}))
            .await
            .unwrap();
        assert_eq!(
            run(&store, "getcomments", json!({"token": "t1"})).await.unwrap(),
            json!([
                {"token": "t1", "comment": "keep"},
                {"token": "t1", "comment": "last"}
            ])
        );
        assert_eq!(
            run(&store, "getnumcomments", json!({"token": "t1"})).await.unwrap(),
            json!({"numcomments": 2})
        );

        // Censoring the newest comment exposes the one before it.
        run(&store, "censorcomment", json!({"token": "t1", "commentid": ids[2]}))
            .await
            .unwrap();
        assert_eq!(
            run(&store, "getcomment", json!({"token": "t1"})).await.unwrap(),
            json!({"token": "t1", "comment": "keep"})
        );

        // The comment must exist under the same token.
        assert!(matches!(
            run(&store, "censorcomment", json!({"token": "t2", "commentid": ids[0]})).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            run(&store, "censorcomment", json!({"token": "t1"})).await,
            Err(StoreError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn journal_after_close_reports_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = registered_store(&dir).await;

        // The command passes the registration gate, then waits on the writer
        // section while the store closes.
        let writer = store.writer.clone().lock_owned().await;
        let pending = {
            let store = store.clone();
            tokio::spawn(async move {
                journal(&store, DecredCommand::Ballot, r#"{"token":"p"}"#, &json!({"token": "p"})).await
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        store.close().await.unwrap();
        drop(writer);

        assert!(matches!(pending.await.unwrap(), Err(StoreError::Shutdown)));
    }
}
