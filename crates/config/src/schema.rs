//! Config schema types.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
}

/// Connection broker behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// File a connection request for any unconnected user who writes in.
    pub auto_request: bool,
    /// Refuse requests with `NoAgentsAvailable` while no aggregation channel
    /// is registered.
    pub reject_if_no_aggregation: bool,
    /// Number of outcomes kept in the in-memory history.
    pub history_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            auto_request: true,
            reject_if_no_aggregation: false,
            history_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    /// sqlx connection string, used when `backend = "sqlite"`.
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Sqlite,
            database_url: "sqlite:parley.db?mode=rwc".into(),
        }
    }
}

/// Channel relay behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Leading string that marks a message as an agent command.
    pub command_prefix: String,
    /// Post new requests into every aggregation conversation.
    pub notify_aggregation: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command_prefix: "/".into(),
            notify_aggregation: true,
        }
    }
}
