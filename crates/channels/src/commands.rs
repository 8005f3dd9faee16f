//! Agent commands typed into a conversation, e.g. `/accept 2`.

/// A parsed agent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Turn this conversation into an aggregation channel.
    Watch,
    /// Stop receiving requests in this conversation.
    Unwatch,
    /// List pending requests.
    Requests,
    /// List established connections.
    Connections,
    /// Connect to the n-th pending request (1-based, oldest first).
    Accept(usize),
    /// Decline the n-th pending request.
    Reject(usize),
    /// End the caller's connection.
    Disconnect,
    /// Drop every party and connection.
    Reset,
    Help,
    /// Unrecognized name or malformed argument; carries the raw input.
    Unknown(String),
}

impl Command {
    /// Parse `text` if it starts with `prefix`. Returns `None` for ordinary
    /// messages.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let body = text.trim().strip_prefix(prefix)?;
        let mut words = body.split_whitespace();
        let name = words.next()?.to_ascii_lowercase();
        let arg = words.next();
        if words.next().is_some() {
            return Some(Self::Unknown(text.trim().to_string()));
        }

        let index = || match arg {
            None => Some(1),
            Some(n) => n.parse::<usize>().ok().filter(|n| *n >= 1),
        };

        let command = match (name.as_str(), arg) {
            ("watch", None) => Self::Watch,
            ("unwatch", None) => Self::Unwatch,
            ("requests", None) => Self::Requests,
            ("connections", None) => Self::Connections,
            ("disconnect", None) => Self::Disconnect,
            ("reset", None) => Self::Reset,
            ("help", None) => Self::Help,
            ("accept", _) => index().map_or_else(|| Self::Unknown(text.trim().into()), Self::Accept),
            ("reject", _) => index().map_or_else(|| Self::Unknown(text.trim().into()), Self::Reject),
            _ => Self::Unknown(text.trim().to_string()),
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Unwatch => "unwatch",
            Self::Requests => "requests",
            Self::Connections => "connections",
            Self::Accept(_) => "accept",
            Self::Reject(_) => "reject",
            Self::Disconnect => "disconnect",
            Self::Reset => "reset",
            Self::Help => "help",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Commands that act on the request queue or the whole registry, and so
    /// only run from an aggregation conversation.
    pub fn requires_agent(&self) -> bool {
        matches!(
            self,
            Self::Requests | Self::Connections | Self::Accept(_) | Self::Reject(_) | Self::Reset
        )
    }
}

pub fn help_text(prefix: &str) -> String {
    [
        ("watch", "receive connection requests in this conversation"),
        ("unwatch", "stop receiving connection requests here"),
        ("requests", "list pending requests"),
        ("connections", "list active connections"),
        ("accept [n]", "connect to request n (default: oldest)"),
        ("reject [n]", "decline request n (default: oldest)"),
        ("disconnect", "end your current connection"),
        ("reset", "remove all parties and connections"),
        ("help", "show this list"),
    ]
    .iter()
    .map(|(cmd, what)| format!("{prefix}{cmd} - {what}"))
    .collect::<Vec<_>>()
    .join("\n")
}
