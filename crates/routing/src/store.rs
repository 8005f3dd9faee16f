//! Storage port the registry and broker are written against.
//!
//! Backends implement plain CRUD primitives only. Every mutating primitive is
//! atomic on its own (insert-if-absent, delete-if-present) so that business
//! rules can be composed on its boolean result instead of a separate
//! existence check.

use std::fmt;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{Result, identity::PartyIdentity};

/// Named collections owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyCategory {
    User,
    Bot,
    Aggregation,
    PendingRequest,
}

impl PartyCategory {
    pub const ALL: &'static [PartyCategory] = &[
        Self::User,
        Self::Bot,
        Self::Aggregation,
        Self::PendingRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Aggregation => "aggregation",
            Self::PendingRequest => "pending_request",
        }
    }
}

impl fmt::Display for PartyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PartyCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" | "users" => Ok(Self::User),
            "bot" | "bots" => Ok(Self::Bot),
            "aggregation" | "aggregations" => Ok(Self::Aggregation),
            "pending" | "pending_request" | "requests" => Ok(Self::PendingRequest),
            other => Err(format!("unknown party category: {other}")),
        }
    }
}

/// An established owner/client pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub owner: PartyIdentity,
    pub client: PartyIdentity,
}

impl Connection {
    pub fn new(owner: PartyIdentity, client: PartyIdentity) -> Self {
        Self { owner, client }
    }

    /// The other side of the pairing, if `identity` is one of its ends.
    pub fn counterpart_of(&self, identity: &PartyIdentity) -> Option<&PartyIdentity> {
        if &self.owner == identity {
            Some(&self.client)
        } else if &self.client == identity {
            Some(&self.owner)
        } else {
            None
        }
    }
}

/// Filter passed to [`StorageBackend::query`].
pub type PartyPredicate<'a> = &'a (dyn Fn(&PartyIdentity) -> bool + Send + Sync);

/// Persistence backend for parties and connections.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert `identity` unless an equal identity is already in `category`.
    /// Returns `false` when it was already present.
    async fn insert(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool>;

    /// Remove the identity equal to `identity` from `category`.
    /// Returns `false` when it was absent.
    async fn delete(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool>;

    /// All identities in `category` accepted by `predicate`, in insertion order.
    async fn query(
        &self,
        category: PartyCategory,
        predicate: PartyPredicate<'_>,
    ) -> Result<Vec<PartyIdentity>>;

    /// Record `owner -> client` unless `owner` already owns a connection.
    async fn insert_connection(&self, owner: &PartyIdentity, client: &PartyIdentity)
    -> Result<bool>;

    /// Remove the connection keyed by `owner`, returning its client.
    async fn delete_connection(&self, owner: &PartyIdentity) -> Result<Option<PartyIdentity>>;

    /// Remove `connection` only if its owner still holds that same client.
    /// Returns `false` when the pair is gone or the owner has moved on.
    async fn remove_connection(&self, connection: &Connection) -> Result<bool>;

    /// Every connection, in insertion order.
    async fn query_connections(&self) -> Result<Vec<Connection>>;

    /// Drop every party in every category and every connection.
    async fn delete_all(&self) -> Result<()>;
}

/// Predicate accepting everything.
pub fn any_party(_: &PartyIdentity) -> bool {
    true
}
