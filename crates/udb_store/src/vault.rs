//! Vault: the in-memory encryption key, the shutdown flag and the plugin
//! registry, behind one shared/exclusive lock.
//!
//! Encrypt/decrypt and shutdown checks take the shared side; close, key
//! rotation and plugin registration take the exclusive side. Closing zeroizes
//! the key, and every later operation fails with `StoreError::Shutdown`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use zeroize::{Zeroize, Zeroizing};

use udb_crypto::{CryptoError, EncryptionKey};
use udb_proto::{Plugin, PluginSetting};

use crate::error::StoreError;

struct VaultState {
    /// Always `Some` while running; taken and zeroized on close.
    key: Option<EncryptionKey>,
    shutdown: bool,
    plugins: HashMap<Plugin, Vec<PluginSetting>>,
}

/// Thread-safe vault handle. Clones share the same state.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<VaultState>>,
}

impl Vault {
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VaultState {
                key: Some(key),
                shutdown: false,
                plugins: HashMap::new(),
            })),
        }
    }

    pub async fn is_shutdown(&self) -> bool {
        self.inner.read().await.shutdown
    }

    /// Shared access to the active key. Held for as long as the caller needs
    /// the key to stay the same, e.g. from row fetch through decryption.
    pub(crate) async fn read(&self) -> Result<KeyGuard<'_>, StoreError> {
        let guard = self.inner.read().await;
        if guard.shutdown {
            return Err(StoreError::Shutdown);
        }
        RwLockReadGuard::try_map(guard, |state| state.key.as_ref())
            .map(|key| KeyGuard { key })
            .map_err(|_| StoreError::Shutdown)
    }

    /// Exclusive access for key swaps and plugin registration.
    pub(crate) async fn write(&self) -> Result<VaultWriteGuard<'_>, StoreError> {
        let state = self.inner.write().await;
        if state.shutdown {
            return Err(StoreError::Shutdown);
        }
        Ok(VaultWriteGuard { state })
    }

    /// Zeroize the key and enter the terminal shutdown state. Only the first
    /// call succeeds.
    pub async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        if state.shutdown {
            return Err(StoreError::Shutdown);
        }
        if let Some(mut key) = state.key.take() {
            key.zeroize();
        }
        state.plugins.clear();
        state.shutdown = true;
        Ok(())
    }

    pub async fn is_registered(&self, plugin: Plugin) -> Result<bool, StoreError> {
        let state = self.inner.read().await;
        if state.shutdown {
            return Err(StoreError::Shutdown);
        }
        Ok(state.plugins.contains_key(&plugin))
    }

    pub async fn plugin_settings(&self, plugin: Plugin) -> Result<Option<Vec<PluginSetting>>, StoreError> {
        let state = self.inner.read().await;
        if state.shutdown {
            return Err(StoreError::Shutdown);
        }
        Ok(state.plugins.get(&plugin).cloned())
    }
}

/// Shared borrow of the active key. Exposes sealing, not the key itself.
pub(crate) struct KeyGuard<'a> {
    key: RwLockReadGuard<'a, EncryptionKey>,
}

impl KeyGuard<'_> {
    pub fn seal(&self, version: u32, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        udb_crypto::seal(version, &self.key, plaintext)
    }

    pub fn open(&self, envelope: &[u8]) -> Result<(Zeroizing<Vec<u8>>, u32), CryptoError> {
        udb_crypto::open(&self.key, envelope)
    }

    pub fn is_active(&self, other: &EncryptionKey) -> bool {
        *self.key == *other
    }
}

pub(crate) struct VaultWriteGuard<'a> {
    state: RwLockWriteGuard<'a, VaultState>,
}

impl VaultWriteGuard<'_> {
    /// Install `key` as the active key and zeroize the one it replaces.
    pub fn replace_key(&mut self, key: EncryptionKey) {
        if let Some(mut old) = self.state.key.replace(key) {
            old.zeroize();
        }
    }

    /// Last registration wins.
    pub fn register(&mut self, plugin: Plugin, settings: Vec<PluginSetting>) {
        self.state.plugins.insert(plugin, settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seal_and_open_through_guard() {
        let vault = Vault::new(EncryptionKey::generate());
        let keys = vault.read().await.unwrap();
        let sealed = keys.seal(1, b"payload").unwrap();
        let (plaintext, version) = keys.open(&sealed).unwrap();
        assert_eq!(plaintext.as_slice(), b"payload");
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let vault = Vault::new(EncryptionKey::generate());
        assert!(!vault.is_shutdown().await);

        vault.close().await.unwrap();
        assert!(vault.is_shutdown().await);
        assert!(matches!(vault.read().await, Err(StoreError::Shutdown)));
        assert!(matches!(vault.write().await, Err(StoreError::Shutdown)));
        assert!(matches!(vault.close().await, Err(StoreError::Shutdown)));
        assert!(matches!(
            vault.is_registered(Plugin::Decred).await,
            Err(StoreError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let vault = Vault::new(EncryptionKey::generate());
        let other = vault.clone();
        vault.close().await.unwrap();
        assert!(other.is_shutdown().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_waits_for_readers() {
        let vault = Vault::new(EncryptionKey::generate());
        let keys = vault.read().await.unwrap();

        let closer = vault.clone();
        let handle = tokio::spawn(async move { closer.close().await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!handle.is_finished());

        // The key is still usable while the shared guard is held.
        let sealed = keys.seal(1, b"in flight").unwrap();
        assert!(keys.open(&sealed).is_ok());
        drop(keys);

        handle.await.unwrap().unwrap();
        assert!(vault.is_shutdown().await);
    }

    #[tokio::test]
    async fn replace_key_swaps_active_key() {
        let vault = Vault::new(EncryptionKey::generate());
        let sealed = vault.read().await.unwrap().seal(1, b"old").unwrap();

        let new_key = EncryptionKey::generate();
        let copy = EncryptionKey::from_hex(&new_key.to_hex()).unwrap();
        vault.write().await.unwrap().replace_key(new_key);

        let keys = vault.read().await.unwrap();
        assert!(keys.is_active(&copy));
        assert!(keys.open(&sealed).is_err());
    }

    #[tokio::test]
    async fn registration_last_write_wins() {
        let vault = Vault::new(EncryptionKey::generate());
        assert!(!vault.is_registered(Plugin::Decred).await.unwrap());

        let setting = |value: &str| PluginSetting {
            key: "mode".into(),
            value: value.into(),
        };
        vault.write().await.unwrap().register(Plugin::Decred, vec![setting("a")]);
        vault.write().await.unwrap().register(Plugin::Decred, vec![setting("b")]);

        assert!(vault.is_registered(Plugin::Decred).await.unwrap());
        assert_eq!(
            vault.plugin_settings(Plugin::Decred).await.unwrap(),
            Some(vec![setting("b")])
        );
    }
}
