//! udb_proto — types shared between the user database and its callers.
//!
//! - `user`    — the `User` aggregate that is sealed into each user row
//! - `plugin`  — plugin registration and command envelopes
//! - `decred`  — the closed command set of the decred plugin

pub mod decred;
pub mod plugin;
pub mod user;

pub use plugin::{Plugin, PluginCommand, PluginCommandReply, PluginRegistration, PluginSetting};
pub use user::{Identity, User, VERSION_USER};

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Unknown {plugin} command: {command}")]
    UnknownCommand { plugin: &'static str, command: String },
}
