use {
    anyhow::{Result, bail},
    chrono::{DateTime, Utc},
    clap::Args,
    parley_routing::{Connection, Outcome, PartyCategory, PartyIdentity, PartyRegistry},
};

/// Selects a stored party by conversation id, narrowed by account id when
/// the conversation holds more than one.
#[derive(Args, Debug, Clone)]
pub struct PartyArgs {
    /// Conversation id of the party.
    pub conversation: String,
    /// Channel account id, when the conversation holds several parties.
    #[arg(long)]
    pub account: Option<String>,
}

impl PartyArgs {
    pub fn new(conversation: String, account: Option<String>) -> Self {
        Self {
            conversation,
            account,
        }
    }

    pub async fn resolve(
        &self,
        registry: &PartyRegistry,
        category: PartyCategory,
    ) -> Result<PartyIdentity> {
        select(
            registry.parties(category).await?,
            &self.conversation,
            self.account.as_deref(),
        )
    }
}

fn select(
    candidates: Vec<PartyIdentity>,
    conversation: &str,
    account: Option<&str>,
) -> Result<PartyIdentity> {
    let mut matches: Vec<_> = candidates
        .into_iter()
        .filter(|p| p.conversation_id == conversation)
        .filter(|p| account.is_none_or(|a| p.channel_account_id.as_deref() == Some(a)))
        .collect();
    match matches.len() {
        0 => bail!("no known party in conversation {conversation}"),
        1 => Ok(matches.remove(0)),
        n => bail!("{n} parties in conversation {conversation}; pass --account to pick one"),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn outcomes(&self, outcomes: &[Outcome]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(outcomes)?);
        } else {
            for outcome in outcomes {
                println!("{outcome}");
            }
        }
        Ok(())
    }
}

pub async fn list_parties(
    registry: &PartyRegistry,
    category: Option<PartyCategory>,
    output: Output,
) -> Result<()> {
    let categories = match category {
        Some(c) => vec![c],
        None => PartyCategory::ALL.to_vec(),
    };

    let mut listing = serde_json::Map::new();
    for category in categories {
        let parties = registry.parties(category).await?;
        if output.json {
            listing.insert(category.to_string(), serde_json::to_value(&parties)?);
            continue;
        }
        println!("{category} ({})", parties.len());
        for party in &parties {
            println!("  {}", describe(party));
        }
    }
    if output.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    }
    Ok(())
}

pub async fn list_connections(registry: &PartyRegistry, output: Output) -> Result<()> {
    let connections = registry.connections().await?;
    if output.json {
        println!("{}", serde_json::to_string_pretty(&connections)?);
        return Ok(());
    }
    if connections.is_empty() {
        println!("No active connections.");
    }
    for Connection { owner, client } in &connections {
        let since = owner.connected_at.map(format_ms).unwrap_or_default();
        println!("  {} <-> {}  {since}", describe(owner), describe(client));
    }
    Ok(())
}

fn describe(party: &PartyIdentity) -> String {
    let mut line = format!("{} [{}]", party.label(), party);
    if let Some(ms) = party.requested_at {
        line.push_str(&format!(" requested {}", format_ms(ms)));
    }
    line
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}
