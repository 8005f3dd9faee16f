//! Conversation-scoped participant addresses.
//!
//! A [`PartyIdentity`] names one participant *inside one conversation*. The
//! same person talking to the bot from two conversations has two identities
//! that are not equal, but that do match each other under
//! [`PartyIdentity::is_same_account`].

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One participant's address within one specific conversation.
///
/// Equality and hashing only look at the address fields (`service_url`,
/// `channel_id`, `channel_account_id`, `conversation_id`). Display names and
/// lifecycle timestamps ride along but never change which record an identity
/// refers to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyIdentity {
    pub service_url: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_account_name: Option<String>,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_name: Option<String>,
    /// Unix ms when the pending request was filed. `None` when not pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<i64>,
    /// Unix ms when the connection was established. `None` when unconnected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
}

impl PartyIdentity {
    pub fn new(
        service_url: impl Into<String>,
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            service_url: service_url.into(),
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_account(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.channel_account_id = Some(id.into());
        self.channel_account_name = name;
        self
    }

    #[must_use]
    pub fn with_conversation_name(mut self, name: impl Into<String>) -> Self {
        self.conversation_name = Some(name.into());
        self
    }

    /// Strip the account so the identity addresses the whole conversation.
    /// Used when a conversation registers itself as an aggregation channel.
    #[must_use]
    pub fn without_account(mut self) -> Self {
        self.channel_account_id = None;
        self.channel_account_name = None;
        self
    }

    /// Ensure every required address field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("service_url", &self.service_url),
            ("channel_id", &self.channel_id),
            ("conversation_id", &self.conversation_id),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Incomplete { field });
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn has_account(&self) -> bool {
        self.channel_account_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }

    /// Same underlying account on the same channel, in any conversation.
    ///
    /// Both sides must carry an account id; two account-less identities never
    /// match, otherwise every aggregation channel would match every other.
    pub fn is_same_account(&self, other: &Self) -> bool {
        self.channel_id == other.channel_id
            && self.has_account()
            && other.has_account()
            && self.channel_account_id == other.channel_account_id
    }

    /// Same conversation on the same service and channel, regardless of account.
    pub fn shares_conversation(&self, other: &Self) -> bool {
        self.conversation_id == other.conversation_id
            && self.service_url == other.service_url
            && self.channel_id == other.channel_id
    }

    pub fn is_pending(&self) -> bool {
        self.requested_at.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_at.is_some()
    }

    #[must_use]
    pub fn requested(mut self, at_ms: i64) -> Self {
        self.requested_at = Some(at_ms);
        self
    }

    #[must_use]
    pub fn connected(mut self, at_ms: i64) -> Self {
        self.connected_at = Some(at_ms);
        self
    }

    pub fn reset_requested(&mut self) {
        self.requested_at = None;
    }

    pub fn reset_connected(&mut self) {
        self.connected_at = None;
    }

    /// Stable storage key derived from the address fields.
    ///
    /// Encoded as a JSON array so that separators inside ids cannot collide.
    pub fn key(&self) -> String {
        serde_json::json!([
            self.service_url,
            self.channel_id,
            self.channel_account_id,
            self.conversation_id,
        ])
        .to_string()
    }

    /// Human-readable label: account name, then account id, then conversation.
    pub fn label(&self) -> &str {
        self.channel_account_name
            .as_deref()
            .or(self.channel_account_id.as_deref())
            .or(self.conversation_name.as_deref())
            .unwrap_or(&self.conversation_id)
    }
}

impl PartialEq for PartyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.service_url == other.service_url
            && self.channel_id == other.channel_id
            && self.channel_account_id == other.channel_account_id
            && self.conversation_id == other.conversation_id
    }
}

impl Eq for PartyIdentity {}

impl Hash for PartyIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_url.hash(state);
        self.channel_id.hash(state);
        self.channel_account_id.hash(state);
        self.conversation_id.hash(state);
    }
}

impl fmt::Display for PartyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel_account_id.as_deref() {
            Some(account) => write!(
                f,
                "{}:{}@{}",
                self.channel_id, account, self.conversation_id
            ),
            None => write!(f, "{}:*@{}", self.channel_id, self.conversation_id),
        }
    }
}
