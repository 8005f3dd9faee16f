//! Inbound activity handling.
//!
//! Every message activity goes through [`Relay::handle_activity`]:
//! 1. sender and recipient are tracked in the registry,
//! 2. agent commands are executed and answered,
//! 3. messages from connected parties are forwarded to their counterpart,
//! 4. anything else may file a connection request.

use std::sync::Arc;

#[cfg(feature = "metrics")]
use parley_metrics::{counter, histogram, relay as relay_metrics};
use {
    parley_config::{BrokerConfig, ParleyConfig, RelayConfig},
    parley_routing::{
        ConnectionBroker, ConnectionProfile, MessageForwarder, Outcome, PartyCategory,
        PartyIdentity,
    },
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    activity::Activity,
    commands::{Command, help_text},
    plugin::ChannelOutbound,
};

/// What the relay did with one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Not a message, no usable sender, or nothing to do.
    Ignored,
    /// Forwarded to the sender's counterpart.
    Forwarded { to: PartyIdentity },
    /// A connection request was attempted on the sender's behalf.
    Requested(Outcome),
    /// An agent command ran; `reply` was sent back to the sender.
    Command { command: Command, reply: String },
}

impl RelayAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Forwarded { .. } => "forwarded",
            Self::Requested(_) => "requested",
            Self::Command { .. } => "command",
        }
    }
}

pub struct Relay {
    broker: Arc<ConnectionBroker>,
    forwarder: Arc<dyn MessageForwarder>,
    outbound: Arc<dyn ChannelOutbound>,
    broker_config: BrokerConfig,
    relay_config: RelayConfig,
}

impl Relay {
    pub fn new(
        broker: Arc<ConnectionBroker>,
        forwarder: Arc<dyn MessageForwarder>,
        outbound: Arc<dyn ChannelOutbound>,
        config: &ParleyConfig,
    ) -> Self {
        Self {
            broker,
            forwarder,
            outbound,
            broker_config: config.broker.clone(),
            relay_config: config.relay.clone(),
        }
    }

    pub fn broker(&self) -> &Arc<ConnectionBroker> {
        &self.broker
    }

    pub async fn handle_activity(&self, activity: &Activity) -> Result<RelayAction> {
        let action = self.dispatch(activity).await?;
        debug!(action = action.kind(), id = ?activity.id, "activity handled");
        #[cfg(feature = "metrics")]
        counter!(relay_metrics::ACTIVITIES_TOTAL, "action" => action.kind()).increment(1);
        Ok(action)
    }

    async fn dispatch(&self, activity: &Activity) -> Result<RelayAction> {
        if !activity.is_message() {
            return Ok(RelayAction::Ignored);
        }
        let Some(sender) = activity.sender() else {
            debug!(id = ?activity.id, "activity without a complete sender address");
            return Ok(RelayAction::Ignored);
        };

        let registry = self.broker.registry();
        registry.add_party(&sender, PartyCategory::User).await?;
        if let Some(bot) = activity.recipient().filter(PartyIdentity::has_account) {
            registry.add_party(&bot, PartyCategory::Bot).await?;
        }

        let text = activity.cleaned_text().unwrap_or_default();

        if let Some(command) = Command::parse(&text, &self.relay_config.command_prefix) {
            let reply = self.run_command(&sender, &command).await?;
            self.notify(&sender, &reply).await;
            return Ok(RelayAction::Command { command, reply });
        }

        if let Some(connection) = self.forwarder.resolve_connection(&sender).await? {
            let Some(to) = connection.counterpart_of(&sender).cloned() else {
                return Ok(RelayAction::Ignored);
            };
            if text.is_empty() {
                return Ok(RelayAction::Ignored);
            }
            self.forward(&to, &text).await?;
            self.forwarder.on_delivered(&connection).await;
            return Ok(RelayAction::Forwarded { to });
        }

        if !self.broker_config.auto_request
            || registry.is_associated_with_aggregation(&sender).await?
        {
            return Ok(RelayAction::Ignored);
        }

        let outcome = self
            .broker
            .request_connection(&sender, self.broker_config.reject_if_no_aggregation)
            .await?;
        if let Some(reply) = request_reply(&outcome) {
            self.notify(&sender, reply).await;
        }
        if let Outcome::Requested { requestor } = &outcome
            && self.relay_config.notify_aggregation
        {
            self.announce_request(requestor).await?;
        }
        Ok(RelayAction::Requested(outcome))
    }

    async fn forward(&self, to: &PartyIdentity, text: &str) -> Result<()> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();
        let result = self.outbound.send_text(to, text).await;
        #[cfg(feature = "metrics")]
        {
            histogram!(relay_metrics::FORWARD_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            match &result {
                Ok(()) => counter!(relay_metrics::FORWARDED_TOTAL).increment(1),
                Err(_) => counter!(relay_metrics::SEND_ERRORS_TOTAL).increment(1),
            }
        }
        result
    }

    /// Best-effort message; failures are logged, not returned.
    async fn notify(&self, to: &PartyIdentity, text: &str) {
        if let Err(e) = self.outbound.send_text(to, text).await {
            warn!(to = %to, error = %e, "failed to send notification");
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::SEND_ERRORS_TOTAL).increment(1);
        }
    }

    async fn announce_request(&self, requestor: &PartyIdentity) -> Result<()> {
        let prefix = &self.relay_config.command_prefix;
        let text = format!(
            "New connection request from {}. Reply {prefix}accept to take it or {prefix}requests to see the queue.",
            requestor.label()
        );
        for channel in self.broker.registry().aggregation_parties().await? {
            self.notify(&channel, &text).await;
        }
        Ok(())
    }

    async fn run_command(&self, sender: &PartyIdentity, command: &Command) -> Result<String> {
        info!(sender = %sender, command = command.name(), "agent command");
        let registry = self.broker.registry();
        let prefix = &self.relay_config.command_prefix;

        if command.requires_agent() && !registry.is_associated_with_aggregation(sender).await? {
            warn!(
                sender = %sender,
                command = command.name(),
                "agent command outside an aggregation conversation"
            );
            return Ok(format!(
                "{prefix}{} is only available in a conversation that receives requests ({prefix}watch).",
                command.name()
            ));
        }

        let reply = match command {
            Command::Watch => {
                let channel = sender.clone().without_account();
                if registry.add_aggregation_party(&channel).await? {
                    "This conversation now receives connection requests.".to_string()
                } else {
                    "This conversation already receives connection requests.".to_string()
                }
            },
            Command::Unwatch => {
                let channel = sender.clone().without_account();
                if registry.remove_aggregation_party(&channel).await? {
                    "This conversation no longer receives connection requests.".to_string()
                } else {
                    "This conversation was not receiving connection requests.".to_string()
                }
            },
            Command::Requests => {
                let pending = registry.pending_requests().await?;
                if pending.is_empty() {
                    "No pending requests.".to_string()
                } else {
                    pending
                        .iter()
                        .enumerate()
                        .map(|(i, p)| format!("{}. {} ({})", i + 1, p.label(), p.channel_id))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            },
            Command::Connections => {
                let connections = registry.connections().await?;
                if connections.is_empty() {
                    "No active connections.".to_string()
                } else {
                    connections
                        .iter()
                        .map(|c| format!("{} <-> {}", c.owner.label(), c.client.label()))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            },
            Command::Accept(n) => match nth_pending(registry.pending_requests().await?, *n) {
                None => format!("There is no request #{n}. Try {prefix}requests."),
                Some(client) => match self.broker.connect(sender, &client).await? {
                    Outcome::Connected { owner, client } => {
                        self.notify(
                            &client,
                            &format!("You are now connected to {}.", owner.label()),
                        )
                        .await;
                        format!("You are now connected to {}.", client.label())
                    },
                    other => format!("Could not connect: {other}."),
                },
            },
            Command::Reject(n) => match nth_pending(registry.pending_requests().await?, *n) {
                None => format!("There is no request #{n}. Try {prefix}requests."),
                Some(client) => match self.broker.cancel_request(&client).await? {
                    Outcome::Rejected { party, .. } => {
                        self.notify(&party, "Your request was declined.").await;
                        format!("Declined the request from {}.", party.label())
                    },
                    other => format!("Could not decline: {other}."),
                },
            },
            Command::Disconnect => {
                let outcomes = self
                    .broker
                    .disconnect(sender, ConnectionProfile::Any)
                    .await?;
                let mut ended = 0;
                for outcome in &outcomes {
                    if let Outcome::Disconnected { owner, client } = outcome {
                        ended += 1;
                        let other = if owner == sender {
                            client
                        } else {
                            owner
                        };
                        self.notify(other, "The conversation has ended.").await;
                    }
                }
                if ended == 0 {
                    "You are not connected.".to_string()
                } else {
                    format!("Ended {ended} connection(s).")
                }
            },
            Command::Reset => {
                registry.delete_all().await?;
                "All parties and connections were removed.".to_string()
            },
            Command::Help => help_text(prefix),
            Command::Unknown(raw) => format!("Unknown command `{raw}`. Try {prefix}help."),
        };
        Ok(reply)
    }
}

fn nth_pending(pending: Vec<PartyIdentity>, n: usize) -> Option<PartyIdentity> {
    pending.into_iter().nth(n.checked_sub(1)?)
}

fn request_reply(outcome: &Outcome) -> Option<&'static str> {
    match outcome {
        Outcome::Requested { .. } => {
            Some("Your request has been received. Please wait for an agent to pick it up.")
        },
        Outcome::AlreadyRequested { .. } => Some("Your request is still waiting for an agent."),
        Outcome::NoAgentsAvailable { .. } => {
            Some("No agents are available right now. Please try again later.")
        },
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, parley_routing::ErrorReason};

    #[test]
    fn nth_pending_is_one_based() {
        let a = PartyIdentity::new("s", "c", "a").with_account("a", None);
        let b = PartyIdentity::new("s", "c", "b").with_account("b", None);
        let pending = vec![a.clone(), b.clone()];
        assert_eq!(nth_pending(pending.clone(), 1), Some(a));
        assert_eq!(nth_pending(pending.clone(), 2), Some(b));
        assert_eq!(nth_pending(pending.clone(), 3), None);
        assert_eq!(nth_pending(pending, 0), None);
    }

    #[test]
    fn request_replies() {
        let p = PartyIdentity::new("s", "c", "a").with_account("a", None);
        assert!(request_reply(&Outcome::Requested { requestor: p.clone() }).is_some());
        assert!(request_reply(&Outcome::NoAgentsAvailable { requestor: p }).is_some());
        assert!(request_reply(&Outcome::error(ErrorReason::NotFound)).is_none());
    }
}
