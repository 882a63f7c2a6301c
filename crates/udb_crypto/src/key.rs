//! Data-at-rest encryption key.
//!
//! The key lives on disk as 64 hex characters (surrounding whitespace is
//! ignored) and in memory as a 32-byte array that is zeroized on drop.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// XChaCha20-Poly1305 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// 32-byte symmetric key. Zeroized on drop; `Debug` is redacted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Decode a key from exactly 64 hex characters.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        if encoded.len() != KEY_SIZE * 2 {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} hex characters, got {}",
                KEY_SIZE * 2,
                encoded.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        hex::decode_to_slice(encoded, bytes.as_mut())?;
        Ok(Self(*bytes))
    }

    /// Load a hex-encoded key file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let contents = Zeroizing::new(fs::read_to_string(path).map_err(|source| {
            CryptoError::KeyFile {
                path: path.to_path_buf(),
                source,
            }
        })?);
        Self::from_hex(contents.trim())
    }

    /// Write the key as hex to a new file. Refuses to overwrite; on unix the
    /// file is created with mode 0600.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CryptoError> {
        let path = path.as_ref();
        let key_file_err = |source| CryptoError::KeyFile {
            path: path.to_path_buf(),
            source,
        };

        let mut opts = OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(path).map_err(key_file_err)?;
        file.write_all(self.to_hex().as_bytes())
            .map_err(key_file_err)?;
        file.sync_all().map_err(key_file_err)
    }

    /// Hex encoding of the key, wiped when dropped.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for EncryptionKey {
    /// Constant-time comparison.
    fn eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for EncryptionKey {}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}
