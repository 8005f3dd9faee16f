//! Message-forwarding seam between a channel relay and the broker.

use std::{collections::HashMap, sync::Arc};

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{
    Result,
    broker::{ClockFn, ConnectionBroker, now_ms},
    identity::PartyIdentity,
    store::Connection,
};

/// Decides where a message from a connected party should go.
#[async_trait]
pub trait MessageForwarder: Send + Sync {
    /// The connection `sender` takes part in, if any.
    async fn resolve_connection(&self, sender: &PartyIdentity) -> Result<Option<Connection>>;

    /// The party a message from `sender` is forwarded to, if any.
    async fn resolve_counterpart(&self, sender: &PartyIdentity) -> Result<Option<PartyIdentity>> {
        Ok(self
            .resolve_connection(sender)
            .await?
            .and_then(|c| c.counterpart_of(sender).cloned()))
    }

    /// Called after a message was delivered across `connection`.
    async fn on_delivered(&self, connection: &Connection);
}

/// Forwarder resolving counterparts through a [`ConnectionBroker`] and
/// tracking the last delivery time per connection.
pub struct BrokerForwarder {
    broker: Arc<ConnectionBroker>,
    last_activity: RwLock<HashMap<String, i64>>,
    clock: ClockFn,
}

impl BrokerForwarder {
    pub fn new(broker: Arc<ConnectionBroker>) -> Self {
        Self {
            broker,
            last_activity: RwLock::new(HashMap::new()),
            clock: Arc::new(now_ms),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    pub fn broker(&self) -> &Arc<ConnectionBroker> {
        &self.broker
    }

    /// Unix ms of the last delivery over the connection owned by `owner`.
    pub async fn last_activity(&self, owner: &PartyIdentity) -> Option<i64> {
        self.last_activity.read().await.get(&owner.key()).copied()
    }
}

#[async_trait]
impl MessageForwarder for BrokerForwarder {
    async fn resolve_connection(&self, sender: &PartyIdentity) -> Result<Option<Connection>> {
        self.broker.connection_of(sender).await
    }

    async fn on_delivered(&self, connection: &Connection) {
        let at = (self.clock)();
        self.last_activity
            .write()
            .await
            .insert(connection.owner.key(), at);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::store_memory::InMemoryBackend};

    fn party(account: &str) -> PartyIdentity {
        PartyIdentity::new("https://s", "msteams", format!("dm-{account}")).with_account(account, None)
    }

    #[tokio::test]
    async fn resolves_both_directions_and_tracks_activity() {
        let broker = Arc::new(ConnectionBroker::new(Arc::new(InMemoryBackend::new())));
        broker.connect(&party("agent"), &party("x")).await.unwrap();
        let forwarder = BrokerForwarder::new(Arc::clone(&broker)).with_clock(Arc::new(|| 7));

        assert_eq!(
            forwarder.resolve_counterpart(&party("x")).await.unwrap(),
            Some(party("agent"))
        );
        assert_eq!(
            forwarder.resolve_counterpart(&party("agent")).await.unwrap(),
            Some(party("x"))
        );
        let connection = forwarder
            .resolve_connection(&party("x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(connection.owner, party("agent"));
        assert!(forwarder
            .resolve_counterpart(&party("y"))
            .await
            .unwrap()
            .is_none());

        assert_eq!(forwarder.last_activity(&party("agent")).await, None);
        forwarder
            .on_delivered(&Connection::new(party("agent"), party("x")))
            .await;
        assert_eq!(forwarder.last_activity(&party("agent")).await, Some(7));
    }
}
