use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (wrong key or tampered envelope)")]
    AeadDecrypt,

    #[error("Envelope too short: {0} bytes")]
    EnvelopeTooShort(usize),

    #[error("Envelope has an unknown magic header")]
    BadMagic,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
