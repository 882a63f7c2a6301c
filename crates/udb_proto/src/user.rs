//! The user aggregate.
//!
//! A `User` is serialized to JSON and sealed as a whole into the `blob`
//! column of its row. Only `id` and `username` are duplicated in plaintext
//! columns for lookup.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate format version, carried in the envelope header.
pub const VERSION_USER: u32 = 1;

/// Ed25519 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// One entry in a user's identity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(with = "hex::serde")]
    pub key: [u8; PUBLIC_KEY_SIZE],
    /// UNIX timestamp the identity was activated (0 = never).
    pub activated: i64,
    /// UNIX timestamp the identity was deactivated (0 = still active).
    pub deactivated: i64,
}

impl Identity {
    /// A freshly activated identity.
    pub fn new(key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            key,
            activated: Utc::now().timestamp(),
            deactivated: 0,
        }
    }

    /// Hex encoding of the public key; this is the lookup key in storage.
    pub fn public_key(&self) -> String {
        hex::encode(self.key)
    }

    pub fn is_active(&self) -> bool {
        self.activated != 0 && self.deactivated == 0
    }
}

/// Complete user record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(default, with = "hex::serde")]
    pub hashed_password: Vec<u8>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub email_notifications: u64,

    /// Assigned by the store on creation; unique per user.
    #[serde(default)]
    pub paywall_address_index: u64,
    #[serde(default)]
    pub new_user_paywall_address: String,
    #[serde(default)]
    pub new_user_paywall_amount: u64,
    #[serde(default)]
    pub new_user_paywall_tx: String,
    #[serde(default)]
    pub new_user_paywall_tx_not_before: i64,
    #[serde(default)]
    pub new_user_paywall_poll_expiry: i64,

    #[serde(default)]
    pub new_user_verification_token: Option<String>,
    #[serde(default)]
    pub new_user_verification_expiry: i64,
    #[serde(default)]
    pub resend_new_user_verification_expiry: i64,
    #[serde(default)]
    pub update_key_verification_token: Option<String>,
    #[serde(default)]
    pub update_key_verification_expiry: i64,
    #[serde(default)]
    pub reset_password_verification_token: Option<String>,
    #[serde(default)]
    pub reset_password_verification_expiry: i64,

    #[serde(default)]
    pub last_login_time: i64,
    #[serde(default)]
    pub failed_login_attempts: u64,
    #[serde(default)]
    pub deactivated: bool,

    /// Every identity the user ever registered, oldest first.
    #[serde(default)]
    pub identities: Vec<Identity>,

    /// Plugin-owned sub-state, keyed by plugin id.
    #[serde(default)]
    pub plugin_data: BTreeMap<String, serde_json::Value>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// The currently active identity, if any.
    pub fn active_identity(&self) -> Option<&Identity> {
        self.identities.iter().rev().find(|id| id.is_active())
    }

    /// Deactivate the current identity and append `key` as the active one.
    /// Older identities stay in the history.
    pub fn rotate_identity(&mut self, key: [u8; PUBLIC_KEY_SIZE]) {
        let now = Utc::now().timestamp();
        for identity in self.identities.iter_mut().filter(|id| id.is_active()) {
            identity.deactivated = now;
        }
        self.identities.push(Identity::new(key));
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
