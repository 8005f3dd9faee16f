//! Result codes returned by registry and broker operations.
//!
//! "Not found" and "already exists" situations are ordinary outcomes, not
//! errors; only validation and storage failures travel through `Err`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::PartyIdentity;

/// Which side of a connection an identity is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionProfile {
    Client,
    Owner,
    #[default]
    Any,
}

impl ConnectionProfile {
    pub fn matches(
        self,
        identity: &PartyIdentity,
        owner: &PartyIdentity,
        client: &PartyIdentity,
    ) -> bool {
        match self {
            Self::Owner => identity == owner,
            Self::Client => identity == client,
            Self::Any => identity == owner || identity == client,
        }
    }
}

impl std::str::FromStr for ConnectionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "owner" => Ok(Self::Owner),
            "any" => Ok(Self::Any),
            other => Err(format!("unknown connection profile: {other}")),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Aggregation conversations are request queues; they cannot queue themselves.
    AggregationPartyCannotRequest,
    /// The pending request was withdrawn or declined.
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorReason {
    /// An argument identity was missing required fields.
    MissingParty,
    /// The owner already holds a connection.
    AlreadyConnected,
    /// Owner and client are the same account.
    SelfConnection,
    /// The targeted record does not exist.
    NotFound,
    /// A storage call failed inside a cascading operation.
    Backend(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParty => f.write_str("missing party"),
            Self::AlreadyConnected => f.write_str("owner already connected"),
            Self::SelfConnection => f.write_str("cannot connect a party to itself"),
            Self::NotFound => f.write_str("not found"),
            Self::Backend(message) => write!(f, "backend failure: {message}"),
        }
    }
}

/// Full outcome vocabulary of the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Requested {
        requestor: PartyIdentity,
    },
    AlreadyRequested {
        requestor: PartyIdentity,
    },
    NoAgentsAvailable {
        requestor: PartyIdentity,
    },
    Rejected {
        party: PartyIdentity,
        reason: RejectReason,
    },
    Connected {
        owner: PartyIdentity,
        client: PartyIdentity,
    },
    AlreadyConnected {
        party: PartyIdentity,
    },
    Disconnected {
        owner: PartyIdentity,
        client: PartyIdentity,
    },
    Removed {
        party: PartyIdentity,
    },
    RequestCancelled {
        party: PartyIdentity,
    },
    NoActionTaken,
    Error {
        reason: ErrorReason,
    },
}

impl Outcome {
    pub fn error(reason: ErrorReason) -> Self {
        Self::Error { reason }
    }

    /// Short snake_case name, used for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Requested { .. } => "requested",
            Self::AlreadyRequested { .. } => "already_requested",
            Self::NoAgentsAvailable { .. } => "no_agents_available",
            Self::Rejected { .. } => "rejected",
            Self::Connected { .. } => "connected",
            Self::AlreadyConnected { .. } => "already_connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Removed { .. } => "removed",
            Self::RequestCancelled { .. } => "request_cancelled",
            Self::NoActionTaken => "no_action_taken",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested { requestor } => write!(f, "{requestor} requested a connection"),
            Self::AlreadyRequested { requestor } => {
                write!(f, "{requestor} already has a pending request")
            },
            Self::NoAgentsAvailable { requestor } => {
                write!(f, "no agents available for {requestor}")
            },
            Self::Rejected { party, reason } => write!(f, "{party} rejected ({reason:?})"),
            Self::Connected { owner, client } => write!(f, "{owner} connected to {client}"),
            Self::AlreadyConnected { party } => write!(f, "{party} is already connected"),
            Self::Disconnected { owner, client } => {
                write!(f, "{owner} disconnected from {client}")
            },
            Self::Removed { party } => write!(f, "{party} removed"),
            Self::RequestCancelled { party } => write!(f, "request from {party} cancelled"),
            Self::NoActionTaken => f.write_str("no action taken"),
            Self::Error { reason } => write!(f, "error: {reason}"),
        }
    }
}
