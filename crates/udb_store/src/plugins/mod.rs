//! Plugin registration and command dispatch.
//!
//! The set of plugins is closed ([`Plugin`]); a plugin has to be registered
//! before its commands are accepted. Registration runs the plugin's schema
//! setup and records its settings in the vault.

mod decred;

use tracing::{debug, info, trace};

use udb_proto::{Plugin, PluginCommand, PluginCommandReply, PluginRegistration, PluginSetting};

use crate::db::Store;
use crate::error::StoreError;

fn parse_plugin(id: &str) -> Result<Plugin, StoreError> {
    id.parse().map_err(|_| StoreError::InvalidPlugin(id.to_owned()))
}

impl Store {
    /// Register a plugin. Re-registering replaces the stored settings; the
    /// schema setup is idempotent.
    pub async fn register_plugin(&self, registration: PluginRegistration) -> Result<(), StoreError> {
        trace!(id = %registration.id, version = %registration.version, "register_plugin");
        self.ensure_open().await?;
        let plugin = parse_plugin(&registration.id)?;
        if registration.version != plugin.version() {
            debug!(
                plugin = %plugin,
                got = %registration.version,
                want = plugin.version(),
                "Plugin version differs from the supported one"
            );
        }

        let _writer = self.writer.lock().await;
        let mut tx = self.begin().await?;
        match plugin {
            Plugin::Decred => decred::setup(&mut *tx).await?,
        }
        tx.commit().await?;
        self.vault.write().await?.register(plugin, registration.settings);

        info!(plugin = %plugin, "Plugin registered");
        Ok(())
    }

    /// Settings of a registered plugin; `InvalidPlugin` if the id is unknown
    /// or was never registered.
    pub async fn plugin_settings(&self, id: &str) -> Result<Vec<PluginSetting>, StoreError> {
        self.ensure_open().await?;
        let plugin = parse_plugin(id)?;
        self.vault
            .plugin_settings(plugin)
            .await?
            .ok_or_else(|| StoreError::InvalidPlugin(id.to_owned()))
    }

    /// Run a plugin command. Handler errors are returned unchanged.
    pub async fn exec(&self, command: PluginCommand) -> Result<PluginCommandReply, StoreError> {
        trace!(id = %command.id, command = %command.command, "exec");
        self.ensure_open().await?;
        let plugin = parse_plugin(&command.id)?;
        if !self.vault.is_registered(plugin).await? {
            return Err(StoreError::InvalidPlugin(command.id));
        }

        let payload = match plugin {
            Plugin::Decred => decred::exec(self, &command.command, &command.payload).await?,
        };
        Ok(PluginCommandReply {
            id: command.id,
            command: command.command,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use udb_crypto::EncryptionKey;

    use super::*;
    use crate::config::StoreConfig;

    async fn store(dir: &tempfile::TempDir) -> Store {
        let key_path = dir.path().join("userdb.key");
        EncryptionKey::generate().save(&key_path).unwrap();
        Store::open(&StoreConfig::new(dir.path().join("users.db"), key_path))
            .await
            .unwrap()
    }

    fn registration(settings: Vec<PluginSetting>) -> PluginRegistration {
        PluginRegistration {
            id: "decred".into(),
            version: "1".into(),
            settings,
        }
    }

    fn command(id: &str, command: &str) -> PluginCommand {
        PluginCommand {
            id: id.into(),
            command: command.into(),
            payload: "{}".into(),
        }
    }

    #[tokio::test]
    async fn unknown_plugin_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut bogus = registration(vec![]);
        bogus.id = "bogus".into();
        assert!(matches!(store.register_plugin(bogus).await, Err(StoreError::InvalidPlugin(_))));
        assert!(matches!(
            store.exec(command("bogus", "inventory")).await,
            Err(StoreError::InvalidPlugin(id)) if id == "bogus"
        ));
    }

    #[tokio::test]
    async fn unregistered_plugin_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        assert!(matches!(
            store.exec(command("decred", "inventory")).await,
            Err(StoreError::InvalidPlugin(_))
        ));
        assert!(matches!(store.plugin_settings("decred").await, Err(StoreError::InvalidPlugin(_))));
    }

    #[tokio::test]
    async fn registration_stores_settings_and_enables_exec() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let settings = vec![PluginSetting {
            key: "network".into(),
            value: "testnet".into(),
        }];
        store.register_plugin(registration(settings.clone())).await.unwrap();
        // Setup is idempotent.
        store.register_plugin(registration(settings.clone())).await.unwrap();
        assert_eq!(store.plugin_settings("decred").await.unwrap(), settings);

        let reply = store.exec(command("decred", "inventory")).await.unwrap();
        assert_eq!(reply.id, "decred");
        assert_eq!(reply.command, "inventory");
        assert_eq!(reply.payload, r#"{"tokens":[]}"#);
    }

    #[tokio::test]
    async fn exec_after_close_is_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.register_plugin(registration(vec![])).await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(
            store.exec(command("decred", "inventory")).await,
            Err(StoreError::Shutdown)
        ));
    }
}
