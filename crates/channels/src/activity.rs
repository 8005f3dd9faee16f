//! Bot Framework activity payloads.

use {
    parley_routing::PartyIdentity,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ActivityAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ActivityAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ActivityConversation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityAccount {
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityConversation {
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.activity_type.eq_ignore_ascii_case("message")
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref()?.id.as_deref()
    }

    /// The author, addressed within this activity's conversation.
    pub fn sender(&self) -> Option<PartyIdentity> {
        self.party(self.from.as_ref()?)
    }

    /// The bot instance the activity was delivered to.
    pub fn recipient(&self) -> Option<PartyIdentity> {
        self.party(self.recipient.as_ref()?)
    }

    fn party(&self, account: &ActivityAccount) -> Option<PartyIdentity> {
        let service_url = self.service_url.as_deref()?;
        let channel_id = self.channel_id.as_deref()?;
        let conversation_id = self.conversation_id()?;
        let mut party = PartyIdentity::new(service_url, channel_id, conversation_id);
        if let Some(id) = account.id.as_deref().filter(|id| !id.is_empty()) {
            party = party.with_account(id, account.name.clone());
        }
        if let Some(name) = self.conversation.as_ref().and_then(|c| c.name.as_deref()) {
            party = party.with_conversation_name(name);
        }
        Some(party)
    }

    /// Message text with `<at>…</at>` mention markup removed, or `None` if
    /// nothing is left.
    pub fn cleaned_text(&self) -> Option<String> {
        let mut text = self.text.clone()?;
        while let Some(start) = text.find("<at>") {
            let Some(end_rel) = text[start + 4..].find("</at>") else {
                break;
            };
            let end = start + 4 + end_rel + 5;
            text.replace_range(start..end, "");
        }

        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Activity {
        serde_json::from_value(serde_json::json!({
            "type": "message",
            "id": "1",
            "text": "<at>Parley</at> hello there ",
            "serviceUrl": "https://smba.example/",
            "channelId": "msteams",
            "from": { "id": "29:alice", "name": "Alice" },
            "recipient": { "id": "28:bot", "name": "Parley" },
            "conversation": { "id": "a:dm-1", "conversationType": "personal" }
        }))
        .unwrap()
    }

    #[test]
    fn derives_sender_and_recipient() {
        let activity = sample();
        let sender = activity.sender().unwrap();
        assert_eq!(sender.channel_account_id.as_deref(), Some("29:alice"));
        assert_eq!(sender.channel_account_name.as_deref(), Some("Alice"));
        assert_eq!(sender.conversation_id, "a:dm-1");
        assert_eq!(sender.channel_id, "msteams");

        let recipient = activity.recipient().unwrap();
        assert_eq!(recipient.channel_account_id.as_deref(), Some("28:bot"));
        assert!(sender.shares_conversation(&recipient));
    }

    #[test]
    fn missing_address_fields_yield_no_party() {
        let mut activity = sample();
        activity.service_url = None;
        assert!(activity.sender().is_none());

        let mut activity = sample();
        activity.conversation = None;
        assert!(activity.recipient().is_none());
    }

    #[test]
    fn empty_account_id_is_treated_as_absent() {
        let mut activity = sample();
        activity.from = Some(ActivityAccount {
            id: Some(String::new()),
            name: None,
        });
        assert!(!activity.sender().unwrap().has_account());
    }

    #[test]
    fn strips_mentions() {
        assert_eq!(sample().cleaned_text().as_deref(), Some("hello there"));

        let mut activity = sample();
        activity.text = Some("<at>Parley</at>".into());
        assert!(activity.cleaned_text().is_none());
    }
}
