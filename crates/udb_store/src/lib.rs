//! udb_store — encrypted user database
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt. We use application-level encryption:
//! - Each user aggregate is serialized to JSON and sealed into a versioned
//!   XChaCha20-Poly1305 envelope (`udb_crypto`) stored in `users.blob`.
//! - Only `id`, `username` and the identity public keys are stored in
//!   plaintext, to allow lookups.
//! - The encryption key is held in memory by the [`Vault`] and zeroized on
//!   close or when it is rotated out.
//!
//! # Concurrency
//! All write transactions run inside one writer section, so the paywall
//! address counter is read and bumped by at most one transaction at a time.
//! Readers hold the vault's shared lock from row fetch through decryption;
//! key rotation and close take the exclusive lock.
//!
//! Locks are always taken in the same order: writer section, then a pool
//! connection or transaction, then the vault. Nothing waits for a connection
//! while holding the vault.
//!
//! # Schema
//! Tables come from the `migrations/` directory and are applied on open;
//! the `version` record must match
//! [`DATABASE_VERSION`] or opening fails.

pub mod config;
pub mod db;
pub mod error;
mod kv;
mod models;
pub mod plugins;
pub mod rotation;
mod users;
pub mod vault;

pub use config::StoreConfig;
pub use db::{Store, DATABASE_VERSION};
pub use error::StoreError;
pub use rotation::RotationReport;
pub use vault::Vault;
