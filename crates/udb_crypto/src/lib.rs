//! udb_crypto — data-at-rest encryption for the user database
//!
//! # Design principles
//! - NO custom crypto; the AEAD comes from `chacha20poly1305`.
//! - Key material is zeroized on drop and never leaves this crate as raw bytes.
//! - Every sealed blob carries a versioned header so the payload format can
//!   evolve independently of the key.
//!
//! # Module layout
//! - `key`       — 32-byte `EncryptionKey`, hex key files, generation
//! - `envelope`  — `seal` / `open` of versioned XChaCha20-Poly1305 envelopes
//! - `error`     — unified error type

pub mod envelope;
pub mod error;
pub mod key;

pub use envelope::{open, seal};
pub use error::CryptoError;
pub use key::{EncryptionKey, KEY_SIZE};
