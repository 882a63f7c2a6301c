//! Plugin registration and command envelopes.
//!
//! The set of plugins is closed and known at compile time. A plugin id
//! string is resolved to a [`Plugin`] variant before anything else happens;
//! command payloads are opaque strings owned by the plugin.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{decred, ProtoError};

/// Every plugin the user database knows how to set up and execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plugin {
    Decred,
}

impl Plugin {
    pub const ALL: &'static [Plugin] = &[Plugin::Decred];

    pub fn id(self) -> &'static str {
        match self {
            Plugin::Decred => decred::ID,
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            Plugin::Decred => decred::VERSION,
        }
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Plugin {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plugin::ALL
            .iter()
            .copied()
            .find(|p| p.id() == s)
            .ok_or_else(|| ProtoError::UnknownPlugin(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSetting {
    pub key: String,
    pub value: String,
}

/// Request to register a plugin with the user database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRegistration {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub settings: Vec<PluginSetting>,
}

/// Opaque command routed to a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCommand {
    pub id: String,
    pub command: String,
    pub payload: String,
}

/// Plugin output, tagged with the command that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCommandReply {
    pub id: String,
    pub command: String,
    pub payload: String,
}
