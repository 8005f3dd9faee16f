use std::sync::Mutex;

use {async_trait::async_trait, parley_routing::PartyIdentity, tracing::info};

use crate::Result;

/// Send messages to a party through its channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, to: &PartyIdentity, text: &str) -> Result<()>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _to: &PartyIdentity) -> Result<()> {
        Ok(())
    }
}

/// One message handed to a [`RecordingOutbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: PartyIdentity,
    pub text: String,
}

/// Outbound that keeps every message in memory and logs it.
///
/// Used for dry runs and replays where no real channel is attached.
#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Messages addressed to `to`, oldest first.
    pub fn sent_to(&self, to: &PartyIdentity) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| &m.to == to)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl ChannelOutbound for RecordingOutbound {
    async fn send_text(&self, to: &PartyIdentity, text: &str) -> Result<()> {
        info!(to = %to, text, "outbound message");
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                to: to.clone(),
                text: text.to_string(),
            });
        Ok(())
    }
}
