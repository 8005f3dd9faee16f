//! Categorized bookkeeping of known parties.
//!
//! The registry owns four identity collections ([`PartyCategory`]) plus the
//! connection table, all held by a [`StorageBackend`]. Reads return owned
//! snapshots; mutation only happens through the methods here and on
//! [`crate::ConnectionBroker`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    Result,
    broker::release_connections,
    error::ValidationError,
    identity::PartyIdentity,
    outcome::{ErrorReason, Outcome},
    store::{Connection, PartyCategory, StorageBackend, any_party},
};

#[derive(Clone)]
pub struct PartyRegistry {
    backend: Arc<dyn StorageBackend>,
}

impl PartyRegistry {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Add `identity` to `category`.
    ///
    /// Returns `false` when an equal identity is already there. Lifecycle
    /// timestamps are stripped for every category except pending requests.
    /// Pending entries also land in `User` and are refused for parties that
    /// belong to an aggregation conversation; regular callers should go
    /// through [`crate::ConnectionBroker::request_connection`] instead.
    pub async fn add_party(&self, identity: &PartyIdentity, category: PartyCategory) -> Result<bool> {
        identity.validate()?;
        match category {
            PartyCategory::Aggregation => return self.add_aggregation_party(identity).await,
            PartyCategory::Bot if !identity.has_account() => {
                return Err(ValidationError::MissingAccount.into());
            },
            PartyCategory::PendingRequest => {
                if self.is_associated_with_aggregation(identity).await? {
                    return Ok(false);
                }
                self.insert_clean(PartyCategory::User, identity).await?;
                let added = self.backend.insert(category, identity).await?;
                if added {
                    debug!(party = %identity, "pending request added");
                }
                return Ok(added);
            },
            PartyCategory::User | PartyCategory::Bot => {},
        }
        self.insert_clean(category, identity).await
    }

    /// Register a whole conversation (no account) as a request queue.
    pub async fn add_aggregation_party(&self, identity: &PartyIdentity) -> Result<bool> {
        identity.validate()?;
        if identity.channel_account_id.is_some() {
            return Err(ValidationError::UnexpectedAccount.into());
        }
        let added = self
            .insert_clean(PartyCategory::Aggregation, identity)
            .await?;
        if added {
            info!(party = %identity, "aggregation channel registered");
        }
        Ok(added)
    }

    /// Unregister an aggregation conversation. Returns `false` if it was not
    /// registered.
    pub async fn remove_aggregation_party(&self, identity: &PartyIdentity) -> Result<bool> {
        identity.validate()?;
        let removed = self
            .backend
            .delete(PartyCategory::Aggregation, identity)
            .await?;
        if removed {
            info!(party = %identity, "aggregation channel unregistered");
        }
        Ok(removed)
    }

    async fn insert_clean(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
        let mut record = identity.clone();
        record.reset_requested();
        record.reset_connected();
        let added = self.backend.insert(category, &record).await?;
        if added {
            debug!(%category, party = %record, "party added");
        }
        Ok(added)
    }

    /// Remove every record of the account behind `identity`, cascading into
    /// pending requests and connections.
    ///
    /// Matching uses [`PartyIdentity::is_same_account`], so all
    /// conversation-scoped records of the account go, not just the one given.
    /// A failing sub-step is reported as an `Error` outcome and the cascade
    /// carries on; only validation fails the call as a whole.
    pub async fn remove_party(&self, identity: &PartyIdentity) -> Result<Vec<Outcome>> {
        identity.validate()?;

        let mut outcomes = Vec::new();
        let mut removed_any = false;
        let same_account = |p: &PartyIdentity| p.is_same_account(identity);

        for category in [PartyCategory::User, PartyCategory::Bot] {
            let matches = match self.backend.query(category, &same_account).await {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(%category, error = %e, "remove_party: query failed");
                    outcomes.push(Outcome::error(ErrorReason::Backend(e.to_string())));
                    continue;
                },
            };
            for party in matches {
                match self.backend.delete(category, &party).await {
                    Ok(true) => {
                        removed_any = true;
                        outcomes.push(Outcome::Removed { party });
                    },
                    Ok(false) => {},
                    Err(e) => {
                        warn!(%category, party = %party, error = %e, "remove_party: delete failed");
                        outcomes.push(Outcome::error(ErrorReason::Backend(e.to_string())));
                    },
                }
            }
        }

        match self
            .backend
            .query(PartyCategory::PendingRequest, &same_account)
            .await
        {
            Ok(pending) => {
                for mut party in pending {
                    match self
                        .backend
                        .delete(PartyCategory::PendingRequest, &party)
                        .await
                    {
                        Ok(true) => {
                            removed_any = true;
                            party.reset_requested();
                            outcomes.push(Outcome::RequestCancelled { party });
                        },
                        Ok(false) => {},
                        Err(e) => {
                            warn!(party = %party, error = %e, "remove_party: cancel failed");
                            outcomes.push(Outcome::error(ErrorReason::Backend(e.to_string())));
                        },
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "remove_party: pending query failed");
                outcomes.push(Outcome::error(ErrorReason::Backend(e.to_string())));
            },
        }

        if removed_any {
            let released = release_connections(self.backend.as_ref(), |c: &Connection| {
                c.owner.is_same_account(identity) || c.client.is_same_account(identity)
            })
            .await;
            outcomes.extend(released);
        }

        if outcomes.is_empty() {
            outcomes.push(Outcome::NoActionTaken);
        } else {
            info!(party = %identity, outcomes = outcomes.len(), "party removed");
        }
        Ok(outcomes)
    }

    /// True if some aggregation entry shares the conversation of `identity`.
    pub async fn is_associated_with_aggregation(&self, identity: &PartyIdentity) -> Result<bool> {
        let matches = self
            .backend
            .query(PartyCategory::Aggregation, &|p: &PartyIdentity| {
                p.shares_conversation(identity)
            })
            .await?;
        Ok(!matches.is_empty())
    }

    /// Candidates belonging to the same account as `identity`.
    pub fn find_same_account(
        identity: &PartyIdentity,
        candidates: &[PartyIdentity],
    ) -> Vec<PartyIdentity> {
        candidates
            .iter()
            .filter(|c| c.is_same_account(identity))
            .cloned()
            .collect()
    }

    pub async fn contains(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
        let matches = self
            .backend
            .query(category, &|p: &PartyIdentity| p == identity)
            .await?;
        Ok(!matches.is_empty())
    }

    pub async fn parties(&self, category: PartyCategory) -> Result<Vec<PartyIdentity>> {
        self.backend.query(category, &any_party).await
    }

    pub async fn user_parties(&self) -> Result<Vec<PartyIdentity>> {
        self.parties(PartyCategory::User).await
    }

    pub async fn bot_parties(&self) -> Result<Vec<PartyIdentity>> {
        self.parties(PartyCategory::Bot).await
    }

    pub async fn aggregation_parties(&self) -> Result<Vec<PartyIdentity>> {
        self.parties(PartyCategory::Aggregation).await
    }

    /// Pending requests, longest waiting first.
    pub async fn pending_requests(&self) -> Result<Vec<PartyIdentity>> {
        self.parties(PartyCategory::PendingRequest).await
    }

    pub async fn connections(&self) -> Result<Vec<Connection>> {
        self.backend.query_connections().await
    }

    /// Drop every party and connection.
    pub async fn delete_all(&self) -> Result<()> {
        self.backend.delete_all().await?;
        info!("party registry reset");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::Error, store_memory::InMemoryBackend},
    };

    fn registry() -> PartyRegistry {
        PartyRegistry::new(Arc::new(InMemoryBackend::new()))
    }

    fn user(account: &str, conversation: &str) -> PartyIdentity {
        PartyIdentity::new("https://smba.example", "msteams", conversation)
            .with_account(account, None)
    }

    fn inbox(conversation: &str) -> PartyIdentity {
        PartyIdentity::new("https://smba.example", "msteams", conversation)
    }

    #[tokio::test]
    async fn add_party_rejects_duplicates() {
        let reg = registry();
        assert!(reg
            .add_party(&user("alice", "c1"), PartyCategory::User)
            .await
            .unwrap());
        assert!(!reg
            .add_party(&user("alice", "c1"), PartyCategory::User)
            .await
            .unwrap());
        assert_eq!(reg.user_parties().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_party_strips_lifecycle_timestamps() {
        let reg = registry();
        reg.add_party(&user("alice", "c1").requested(9).connected(10), PartyCategory::User)
            .await
            .unwrap();
        let stored = &reg.user_parties().await.unwrap()[0];
        assert!(!stored.is_pending());
        assert!(!stored.is_connected());
    }

    #[tokio::test]
    async fn bot_party_requires_account() {
        let reg = registry();
        let err = reg
            .add_party(&inbox("c1"), PartyCategory::Bot)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingAccount)
        ));
        assert!(reg.bot_parties().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn incomplete_identity_is_rejected() {
        let reg = registry();
        let err = reg
            .add_party(&user("alice", ""), PartyCategory::User)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn aggregation_party_must_not_carry_account() {
        let reg = registry();
        let err = reg
            .add_aggregation_party(&user("alice", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnexpectedAccount)
        ));
        assert!(reg.aggregation_parties().await.unwrap().is_empty());

        // Routed through add_party as well.
        assert!(reg
            .add_party(&user("alice", "c1"), PartyCategory::Aggregation)
            .await
            .is_err());
        assert!(reg
            .add_party(&inbox("c1"), PartyCategory::Aggregation)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn remove_aggregation_party() {
        let reg = registry();
        reg.add_aggregation_party(&inbox("c1")).await.unwrap();
        assert!(reg.remove_aggregation_party(&inbox("c1")).await.unwrap());
        assert!(!reg.remove_aggregation_party(&inbox("c1")).await.unwrap());
    }

    #[tokio::test]
    async fn association_ignores_account() {
        let reg = registry();
        reg.add_aggregation_party(&inbox("support")).await.unwrap();
        assert!(reg
            .is_associated_with_aggregation(&user("agent", "support"))
            .await
            .unwrap());
        assert!(!reg
            .is_associated_with_aggregation(&user("agent", "dm"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn pending_via_add_party_tracks_user_and_respects_aggregation() {
        let reg = registry();
        let alice = user("alice", "c1").requested(1);
        assert!(reg
            .add_party(&alice, PartyCategory::PendingRequest)
            .await
            .unwrap());
        assert!(reg.contains(PartyCategory::User, &alice).await.unwrap());
        assert_eq!(reg.pending_requests().await.unwrap()[0].requested_at, Some(1));

        reg.add_aggregation_party(&inbox("support")).await.unwrap();
        assert!(!reg
            .add_party(&user("agent", "support"), PartyCategory::PendingRequest)
            .await
            .unwrap());
    }

    #[test]
    fn find_same_account_handles_empty_and_misses() {
        let alice = user("alice", "c1");
        assert!(PartyRegistry::find_same_account(&alice, &[]).is_empty());

        let candidates = vec![user("alice", "c2"), user("bob", "c1"), user("alice", "c3")];
        let found = PartyRegistry::find_same_account(&alice, &candidates);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.is_same_account(&alice)));
    }

    #[tokio::test]
    async fn remove_party_removes_every_conversation_of_the_account() {
        let reg = registry();
        reg.add_party(&user("alice", "c1"), PartyCategory::User)
            .await
            .unwrap();
        reg.add_party(&user("alice", "c2"), PartyCategory::User)
            .await
            .unwrap();
        reg.add_party(&user("bob", "c3"), PartyCategory::User)
            .await
            .unwrap();

        let outcomes = reg.remove_party(&user("alice", "c1")).await.unwrap();
        let removed = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Removed { .. }))
            .count();
        assert_eq!(removed, 2);

        let remaining = reg.user_parties().await.unwrap();
        assert_eq!(remaining, vec![user("bob", "c3")]);
    }

    #[tokio::test]
    async fn remove_unknown_party_takes_no_action() {
        let reg = registry();
        let outcomes = reg.remove_party(&user("ghost", "c1")).await.unwrap();
        assert_eq!(outcomes, vec![Outcome::NoActionTaken]);
    }

    #[tokio::test]
    async fn delete_all_resets_registry() {
        let reg = registry();
        reg.add_party(&user("alice", "c1"), PartyCategory::User)
            .await
            .unwrap();
        reg.add_aggregation_party(&inbox("support")).await.unwrap();
        reg.delete_all().await.unwrap();
        for category in PartyCategory::ALL {
            assert!(reg.parties(*category).await.unwrap().is_empty());
        }
    }
}
