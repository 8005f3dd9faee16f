//! Pending-request and 1:1 connection lifecycle.
//!
//! Per party: `Unconnected -> PendingRequest -> Connected -> Unconnected`.
//! Every check-then-act step is composed on an atomic backend primitive, so
//! concurrent calls for the same identity cannot both succeed.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use parley_metrics::{broker as broker_metrics, counter};

use crate::{
    Result,
    history::OutcomeObserver,
    identity::PartyIdentity,
    outcome::{ConnectionProfile, ErrorReason, Outcome, RejectReason},
    registry::PartyRegistry,
    store::{Connection, PartyCategory, StorageBackend},
};

/// Source of "now" in Unix milliseconds.
pub type ClockFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wall-clock Unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Brokers pending requests and owner/client connections on top of a
/// [`PartyRegistry`].
pub struct ConnectionBroker {
    registry: PartyRegistry,
    clock: ClockFn,
    observers: Vec<Arc<dyn OutcomeObserver>>,
}

impl ConnectionBroker {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_registry(PartyRegistry::new(backend))
    }

    pub fn with_registry(registry: PartyRegistry) -> Self {
        Self {
            registry,
            clock: Arc::new(now_ms),
            observers: Vec::new(),
        }
    }

    /// Replace the wall clock, e.g. with a deterministic one in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn registry(&self) -> &PartyRegistry {
        &self.registry
    }

    fn backend(&self) -> &dyn StorageBackend {
        self.registry.backend().as_ref()
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn report(&self, outcome: &Outcome) {
        debug!(outcome = outcome.kind(), "{outcome}");
        #[cfg(feature = "metrics")]
        counter!(broker_metrics::OUTCOMES_TOTAL, "outcome" => outcome.kind()).increment(1);
        for observer in &self.observers {
            observer.observe(outcome);
        }
    }

    fn finish(&self, outcome: Outcome) -> Outcome {
        self.report(&outcome);
        outcome
    }

    fn finish_all(&self, outcomes: Vec<Outcome>) -> Vec<Outcome> {
        for outcome in &outcomes {
            self.report(outcome);
        }
        outcomes
    }

    /// File a connection request for `requestor`.
    ///
    /// The requestor is tracked as a user party first. When
    /// `reject_if_no_aggregation` is set and no aggregation channel exists,
    /// nobody could pick the request up, so it is refused with
    /// `NoAgentsAvailable`.
    pub async fn request_connection(
        &self,
        requestor: &PartyIdentity,
        reject_if_no_aggregation: bool,
    ) -> Result<Outcome> {
        self.registry
            .add_party(requestor, PartyCategory::User)
            .await?;

        if self.registry.is_associated_with_aggregation(requestor).await? {
            return Ok(self.finish(Outcome::Rejected {
                party: requestor.clone(),
                reason: RejectReason::AggregationPartyCannotRequest,
            }));
        }

        if self
            .registry
            .contains(PartyCategory::PendingRequest, requestor)
            .await?
        {
            return Ok(self.finish(Outcome::AlreadyRequested {
                requestor: requestor.clone(),
            }));
        }

        if self.is_connected(requestor, ConnectionProfile::Any).await? {
            return Ok(self.finish(Outcome::AlreadyConnected {
                party: requestor.clone(),
            }));
        }

        if reject_if_no_aggregation && self.registry.aggregation_parties().await?.is_empty() {
            return Ok(self.finish(Outcome::NoAgentsAvailable {
                requestor: requestor.clone(),
            }));
        }

        let pending = requestor.clone().requested(self.now());
        // Insert-if-absent settles a race with a concurrent request that
        // slipped past the check above.
        let outcome = if self
            .backend()
            .insert(PartyCategory::PendingRequest, &pending)
            .await?
        {
            info!(requestor = %pending, "connection requested");
            Outcome::Requested { requestor: pending }
        } else {
            Outcome::AlreadyRequested {
                requestor: requestor.clone(),
            }
        };
        Ok(self.finish(outcome))
    }

    /// Withdraw or decline the pending request of `requestor`.
    pub async fn cancel_request(&self, requestor: &PartyIdentity) -> Result<Outcome> {
        let outcome = if self
            .backend()
            .delete(PartyCategory::PendingRequest, requestor)
            .await?
        {
            let mut party = requestor.clone();
            party.reset_requested();
            info!(requestor = %party, "connection request withdrawn");
            Outcome::Rejected {
                party,
                reason: RejectReason::Withdrawn,
            }
        } else {
            Outcome::error(ErrorReason::NotFound)
        };
        Ok(self.finish(outcome))
    }

    /// Pair `owner` with `client`.
    ///
    /// An owner holds at most one connection; an existing one is never
    /// overwritten. Owner and client must be different accounts. Any pending
    /// request of `client` is cleared.
    pub async fn connect(&self, owner: &PartyIdentity, client: &PartyIdentity) -> Result<Outcome> {
        if !owner.is_complete() || !client.is_complete() {
            return Ok(self.finish(Outcome::error(ErrorReason::MissingParty)));
        }
        if owner == client || owner.is_same_account(client) {
            return Ok(self.finish(Outcome::error(ErrorReason::SelfConnection)));
        }

        let now = self.now();
        let mut owner = owner.clone().connected(now);
        let mut client = client.clone().connected(now);
        owner.reset_requested();
        client.reset_requested();

        if !self.backend().insert_connection(&owner, &client).await? {
            return Ok(self.finish(Outcome::error(ErrorReason::AlreadyConnected)));
        }

        // Absent is fine: the client may never have queued.
        if self
            .backend()
            .delete(PartyCategory::PendingRequest, &client)
            .await?
        {
            debug!(client = %client, "pending request cleared by connect");
        }

        info!(owner = %owner, client = %client, "connected");
        Ok(self.finish(Outcome::Connected { owner, client }))
    }

    /// Tear down the connections `identity` takes part in, as selected by
    /// `profile`.
    pub async fn disconnect(
        &self,
        identity: &PartyIdentity,
        profile: ConnectionProfile,
    ) -> Result<Vec<Outcome>> {
        let outcomes = if profile == ConnectionProfile::Owner {
            // Owners are unique keys: at most one pair can match.
            match self.backend().delete_connection(identity).await? {
                Some(client) => vec![disconnected(identity.clone(), client)],
                None => Vec::new(),
            }
        } else {
            // A client may sit under several owners, so look at every pair.
            let mut outcomes = Vec::new();
            for connection in self.backend().query_connections().await? {
                if !profile.matches(identity, &connection.owner, &connection.client) {
                    continue;
                }
                // The owner may have moved on since the listing.
                if self.backend().remove_connection(&connection).await? {
                    outcomes.push(disconnected(connection.owner, connection.client));
                }
            }
            outcomes
        };

        if outcomes.is_empty() {
            return Ok(self.finish_all(vec![Outcome::NoActionTaken]));
        }
        info!(party = %identity, count = outcomes.len(), "disconnected");
        Ok(self.finish_all(outcomes))
    }

    /// The party on the other side of `identity`'s connection.
    ///
    /// Client side is checked first: the first owner holding `identity` as
    /// its client wins.
    pub async fn counterpart(&self, identity: &PartyIdentity) -> Result<Option<PartyIdentity>> {
        Ok(self.connection_of(identity).await?.map(|c| {
            if &c.client == identity {
                c.owner
            } else {
                c.client
            }
        }))
    }

    pub async fn is_connected(
        &self,
        identity: &PartyIdentity,
        profile: ConnectionProfile,
    ) -> Result<bool> {
        Ok(self
            .backend()
            .query_connections()
            .await?
            .iter()
            .any(|c| profile.matches(identity, &c.owner, &c.client)))
    }

    /// Connection in which `identity` takes part, client side first.
    pub async fn connection_of(&self, identity: &PartyIdentity) -> Result<Option<Connection>> {
        let mut connections = self.backend().query_connections().await?;
        let as_client = connections.iter().position(|c| &c.client == identity);
        let idx = as_client.or_else(|| connections.iter().position(|c| &c.owner == identity));
        Ok(idx.map(|i| connections.swap_remove(i)))
    }

    /// Cascading removal; see [`PartyRegistry::remove_party`].
    pub async fn remove_party(&self, identity: &PartyIdentity) -> Result<Vec<Outcome>> {
        let outcomes = self.registry.remove_party(identity).await?;
        Ok(self.finish_all(outcomes))
    }
}

fn disconnected(mut owner: PartyIdentity, mut client: PartyIdentity) -> Outcome {
    owner.reset_connected();
    client.reset_connected();
    Outcome::Disconnected { owner, client }
}

/// Release every connection accepted by `matches`, reporting failures as
/// outcomes instead of aborting.
pub(crate) async fn release_connections(
    backend: &dyn StorageBackend,
    matches: impl Fn(&Connection) -> bool,
) -> Vec<Outcome> {
    let connections = match backend.query_connections().await {
        Ok(connections) => connections,
        Err(e) => {
            warn!(error = %e, "failed to list connections");
            return vec![Outcome::error(ErrorReason::Backend(e.to_string()))];
        },
    };

    let mut outcomes = Vec::new();
    for connection in connections.into_iter().filter(|c| matches(c)) {
        match backend.remove_connection(&connection).await {
            Ok(true) => outcomes.push(disconnected(connection.owner, connection.client)),
            Ok(false) => {},
            Err(e) => {
                warn!(owner = %connection.owner, error = %e, "failed to release connection");
                outcomes.push(Outcome::error(ErrorReason::Backend(e.to_string())));
            },
        }
    }
    outcomes
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use {
        super::*,
        crate::{history::OutcomeHistory, store_memory::InMemoryBackend},
    };

    fn ticking_clock() -> ClockFn {
        let tick = Arc::new(AtomicI64::new(1_000));
        Arc::new(move || tick.fetch_add(1, Ordering::SeqCst))
    }

    fn broker() -> ConnectionBroker {
        ConnectionBroker::new(Arc::new(InMemoryBackend::new())).with_clock(ticking_clock())
    }

    fn user(account: &str) -> PartyIdentity {
        PartyIdentity::new("https://smba.example", "msteams", format!("dm-{account}"))
            .with_account(account, Some(account.to_uppercase()))
    }

    fn inbox() -> PartyIdentity {
        PartyIdentity::new("https://smba.example", "msteams", "support-inbox")
    }

    #[tokio::test]
    async fn request_is_idempotent() {
        let broker = broker();
        let first = broker.request_connection(&user("x"), false).await.unwrap();
        let second = broker.request_connection(&user("x"), false).await.unwrap();
        assert!(matches!(first, Outcome::Requested { .. }));
        assert!(matches!(second, Outcome::AlreadyRequested { .. }));
        assert_eq!(broker.registry().pending_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_stamps_time_and_tracks_user() {
        let broker = broker();
        let Outcome::Requested { requestor } =
            broker.request_connection(&user("x"), false).await.unwrap()
        else {
            panic!("expected Requested");
        };
        assert_eq!(requestor.requested_at, Some(1_000));
        assert!(broker
            .registry()
            .contains(PartyCategory::User, &user("x"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn pending_requests_keep_request_order() {
        let broker = broker();
        let names = ["e", "a", "d", "b", "c"];
        for name in names {
            broker.request_connection(&user(name), false).await.unwrap();
        }
        let pending = broker.registry().pending_requests().await.unwrap();
        let accounts: Vec<_> = pending
            .iter()
            .map(|p| p.channel_account_id.clone().unwrap())
            .collect();
        assert_eq!(accounts, names);
        let stamps: Vec<_> = pending.iter().map(|p| p.requested_at.unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn request_without_agents_is_gated() {
        let broker = broker();
        let outcome = broker.request_connection(&user("x"), true).await.unwrap();
        assert!(matches!(outcome, Outcome::NoAgentsAvailable { .. }));
        assert!(broker.registry().pending_requests().await.unwrap().is_empty());

        broker
            .registry()
            .add_aggregation_party(&inbox())
            .await
            .unwrap();
        let outcome = broker.request_connection(&user("x"), true).await.unwrap();
        assert!(matches!(outcome, Outcome::Requested { .. }));
    }

    #[tokio::test]
    async fn aggregation_member_cannot_request() {
        let broker = broker();
        broker
            .registry()
            .add_aggregation_party(&inbox())
            .await
            .unwrap();
        let agent = PartyIdentity::new("https://smba.example", "msteams", "support-inbox")
            .with_account("agent", None);
        let outcome = broker.request_connection(&agent, false).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected {
            party: agent,
            reason: RejectReason::AggregationPartyCannotRequest,
        });
        assert!(broker.registry().pending_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn connected_party_cannot_request() {
        let broker = broker();
        broker.connect(&user("agent"), &user("x")).await.unwrap();
        let outcome = broker.request_connection(&user("x"), false).await.unwrap();
        assert!(matches!(outcome, Outcome::AlreadyConnected { .. }));
    }

    #[tokio::test]
    async fn cancel_request() {
        let broker = broker();
        broker.request_connection(&user("x"), false).await.unwrap();
        let outcome = broker.cancel_request(&user("x")).await.unwrap();
        let Outcome::Rejected { party, reason } = outcome else {
            panic!("expected Rejected, got {outcome:?}");
        };
        assert_eq!(reason, RejectReason::Withdrawn);
        assert!(!party.is_pending());
        assert!(broker.registry().pending_requests().await.unwrap().is_empty());

        let again = broker.cancel_request(&user("x")).await.unwrap();
        assert_eq!(again, Outcome::error(ErrorReason::NotFound));
    }

    #[tokio::test]
    async fn connect_clears_pending_request() {
        let broker = broker();
        broker.request_connection(&user("x"), false).await.unwrap();
        let outcome = broker.connect(&user("agent"), &user("x")).await.unwrap();
        let Outcome::Connected { owner, client } = outcome else {
            panic!("expected Connected");
        };
        assert!(owner.is_connected());
        assert!(client.is_connected());
        assert!(!client.is_pending());
        assert!(broker.registry().pending_requests().await.unwrap().is_empty());
        assert_eq!(broker.registry().connections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_without_pending_request_is_fine() {
        let broker = broker();
        let outcome = broker.connect(&user("agent"), &user("x")).await.unwrap();
        assert!(matches!(outcome, Outcome::Connected { .. }));
    }

    #[tokio::test]
    async fn connect_never_overwrites_owner() {
        let broker = broker();
        broker.connect(&user("agent"), &user("x")).await.unwrap();
        let outcome = broker.connect(&user("agent"), &user("y")).await.unwrap();
        assert_eq!(outcome, Outcome::error(ErrorReason::AlreadyConnected));
        assert_eq!(
            broker.counterpart(&user("agent")).await.unwrap(),
            Some(user("x"))
        );
    }

    #[tokio::test]
    async fn connect_rejects_incomplete_party() {
        let broker = broker();
        let ghost = PartyIdentity::new("https://smba.example", "", "c");
        let outcome = broker.connect(&user("agent"), &ghost).await.unwrap();
        assert_eq!(outcome, Outcome::error(ErrorReason::MissingParty));
        assert!(broker.registry().connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn connect_rejects_same_account() {
        let broker = broker();
        broker.request_connection(&user("x"), false).await.unwrap();

        let outcome = broker.connect(&user("x"), &user("x")).await.unwrap();
        assert_eq!(outcome, Outcome::error(ErrorReason::SelfConnection));

        // Another conversation of the same account is still the same party.
        let other_chat = PartyIdentity::new("https://smba.example", "msteams", "group-1")
            .with_account("x", None);
        let outcome = broker.connect(&other_chat, &user("x")).await.unwrap();
        assert_eq!(outcome, Outcome::error(ErrorReason::SelfConnection));

        assert!(broker.registry().connections().await.unwrap().is_empty());
        assert_eq!(broker.registry().pending_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_disconnect_round_trip() {
        let broker = broker();
        let (a, b) = (user("agent"), user("x"));
        broker.connect(&a, &b).await.unwrap();
        assert_eq!(broker.counterpart(&a).await.unwrap(), Some(b.clone()));
        assert_eq!(broker.counterpart(&b).await.unwrap(), Some(a.clone()));

        let outcomes = broker.disconnect(&a, ConnectionProfile::Owner).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let Outcome::Disconnected { owner, client } = &outcomes[0] else {
            panic!("expected Disconnected");
        };
        assert_eq!((owner, client), (&a, &b));
        assert!(!owner.is_connected());
        assert!(!client.is_connected());

        assert!(broker.counterpart(&a).await.unwrap().is_none());
        assert!(broker.counterpart(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disconnect_profile_scoping() {
        let broker = broker();
        broker.connect(&user("agent"), &user("x")).await.unwrap();

        // The client is not an owner.
        let outcomes = broker
            .disconnect(&user("x"), ConnectionProfile::Owner)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![Outcome::NoActionTaken]);

        let outcomes = broker
            .disconnect(&user("x"), ConnectionProfile::Client)
            .await
            .unwrap();
        assert!(matches!(outcomes[0], Outcome::Disconnected { .. }));
        assert!(!broker
            .is_connected(&user("agent"), ConnectionProfile::Any)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn client_under_two_owners_is_fully_released() {
        let broker = broker();
        broker.connect(&user("a1"), &user("x")).await.unwrap();
        broker.connect(&user("a2"), &user("x")).await.unwrap();

        // First owner found wins the reverse lookup.
        assert_eq!(broker.counterpart(&user("x")).await.unwrap(), Some(user("a1")));

        let outcomes = broker
            .disconnect(&user("x"), ConnectionProfile::Any)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(broker.registry().connections().await.unwrap().is_empty());
    }

    /// Hands out a connection listing, then lets the owner switch clients
    /// before the caller acts on it.
    struct OwnerMovesOn {
        inner: InMemoryBackend,
        next_client: PartyIdentity,
    }

    #[async_trait::async_trait]
    impl StorageBackend for OwnerMovesOn {
        async fn insert(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
            self.inner.insert(category, identity).await
        }

        async fn delete(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
            self.inner.delete(category, identity).await
        }

        async fn query(
            &self,
            category: PartyCategory,
            predicate: crate::store::PartyPredicate<'_>,
        ) -> Result<Vec<PartyIdentity>> {
            self.inner.query(category, predicate).await
        }

        async fn insert_connection(
            &self,
            owner: &PartyIdentity,
            client: &PartyIdentity,
        ) -> Result<bool> {
            self.inner.insert_connection(owner, client).await
        }

        async fn delete_connection(&self, owner: &PartyIdentity) -> Result<Option<PartyIdentity>> {
            self.inner.delete_connection(owner).await
        }

        async fn remove_connection(&self, connection: &Connection) -> Result<bool> {
            self.inner.remove_connection(connection).await
        }

        async fn query_connections(&self) -> Result<Vec<Connection>> {
            let listing = self.inner.query_connections().await?;
            for c in &listing {
                self.inner.delete_connection(&c.owner).await?;
                self.inner
                    .insert_connection(&c.owner, &self.next_client)
                    .await?;
            }
            Ok(listing)
        }

        async fn delete_all(&self) -> Result<()> {
            self.inner.delete_all().await
        }
    }

    #[tokio::test]
    async fn disconnect_leaves_a_newer_pairing_alone() {
        let inner = InMemoryBackend::new();
        inner
            .insert_connection(&user("agent"), &user("x"))
            .await
            .unwrap();
        let backend = Arc::new(OwnerMovesOn {
            inner,
            next_client: user("y"),
        });
        let broker = ConnectionBroker::new(backend.clone());

        let outcomes = broker
            .disconnect(&user("x"), ConnectionProfile::Client)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![Outcome::NoActionTaken]);

        let remaining = backend.inner.query_connections().await.unwrap();
        assert_eq!(remaining, vec![Connection::new(user("agent"), user("y"))]);
    }

    #[tokio::test]
    async fn is_connected_respects_profile() {
        let broker = broker();
        broker.connect(&user("agent"), &user("x")).await.unwrap();
        assert!(broker
            .is_connected(&user("agent"), ConnectionProfile::Owner)
            .await
            .unwrap());
        assert!(!broker
            .is_connected(&user("agent"), ConnectionProfile::Client)
            .await
            .unwrap());
        assert!(broker
            .is_connected(&user("x"), ConnectionProfile::Client)
            .await
            .unwrap());
        assert!(!broker
            .is_connected(&user("y"), ConnectionProfile::Any)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn remove_party_cascades_into_connections() {
        let broker = broker();
        let (a, b) = (user("agent"), user("x"));
        broker.registry().add_party(&a, PartyCategory::User).await.unwrap();
        broker.registry().add_party(&b, PartyCategory::User).await.unwrap();
        broker.connect(&a, &b).await.unwrap();

        let outcomes = broker.remove_party(&b).await.unwrap();
        assert!(outcomes.contains(&Outcome::Disconnected {
            owner: a.clone(),
            client: b.clone(),
        }));
        assert!(broker.registry().connections().await.unwrap().is_empty());
        assert!(broker.counterpart(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_party_clears_every_trace_of_the_account() {
        let broker = broker();
        let x_dm = user("x");
        let x_group = PartyIdentity::new("https://smba.example", "msteams", "group-1")
            .with_account("x", None);
        broker.request_connection(&x_dm, false).await.unwrap();
        broker
            .registry()
            .add_party(&x_group, PartyCategory::Bot)
            .await
            .unwrap();
        broker.connect(&x_group, &user("y")).await.unwrap();
        broker.connect(&user("agent"), &x_dm).await.unwrap();
        broker.request_connection(&x_group, false).await.ok();

        let outcomes = broker.remove_party(&x_dm).await.unwrap();
        assert!(outcomes.iter().any(|o| matches!(o, Outcome::Removed { .. })));

        let registry = broker.registry();
        for category in [
            PartyCategory::User,
            PartyCategory::Bot,
            PartyCategory::PendingRequest,
        ] {
            let left = registry.parties(category).await.unwrap();
            assert!(
                PartyRegistry::find_same_account(&x_dm, &left).is_empty(),
                "{category} still holds the account"
            );
        }
        for c in registry.connections().await.unwrap() {
            assert!(!c.owner.is_same_account(&x_dm));
            assert!(!c.client.is_same_account(&x_dm));
        }
    }

    #[tokio::test]
    async fn remove_party_cancels_pending_request() {
        let broker = broker();
        broker.request_connection(&user("x"), false).await.unwrap();
        let outcomes = broker.remove_party(&user("x")).await.unwrap();
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Outcome::RequestCancelled { party } if !party.is_pending())));
        assert!(broker.registry().pending_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn observers_see_every_outcome() {
        let history = Arc::new(OutcomeHistory::new(10));
        let broker = ConnectionBroker::new(Arc::new(InMemoryBackend::new()))
            .with_observer(history.clone());
        broker.request_connection(&user("x"), false).await.unwrap();
        broker.connect(&user("agent"), &user("x")).await.unwrap();
        broker
            .disconnect(&user("agent"), ConnectionProfile::Owner)
            .await
            .unwrap();

        let kinds: Vec<_> = history
            .entries()
            .iter()
            .map(|e| e.outcome.kind())
            .collect();
        assert_eq!(kinds, ["requested", "connected", "disconnected"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_yield_a_single_requested() {
        let broker = Arc::new(broker());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let broker = Arc::clone(&broker);
            handles.push(tokio::spawn(async move {
                broker.request_connection(&user("x"), false).await.unwrap()
            }));
        }
        let mut requested = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Outcome::Requested { .. } => requested += 1,
                Outcome::AlreadyRequested { .. } => {},
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(requested, 1);
        assert_eq!(broker.registry().pending_requests().await.unwrap().len(), 1);
    }
}
