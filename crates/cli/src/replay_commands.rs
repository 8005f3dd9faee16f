use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    clap::Args,
    parley_channels::{Activity, RecordingOutbound, Relay},
    parley_config::{ParleyConfig, StorageKind},
    parley_routing::BrokerForwarder,
    tracing::warn,
};

use crate::party_commands::Output;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines file, one Bot Framework activity per line.
    pub file: PathBuf,

    /// Run against a throwaway in-memory store.
    #[arg(long)]
    pub in_memory: bool,

    /// Print the broker outcome history afterwards.
    #[arg(long)]
    pub history: bool,

    /// Print collected metrics afterwards.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    pub metrics: bool,
}

/// Parse a JSON-lines document. Blank lines and `#` comments are skipped.
fn parse_activities(content: &str) -> Result<Vec<(usize, Activity)>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .map(|activity| (idx + 1, activity))
                .with_context(|| format!("line {}: invalid activity", idx + 1))
        })
        .collect()
}

pub async fn handle_replay(args: ReplayArgs, mut config: ParleyConfig, output: Output) -> Result<()> {
    #[cfg(feature = "metrics")]
    let metrics = parley_metrics::init_metrics(parley_metrics::MetricsRecorderConfig {
        enabled: args.metrics,
        ..Default::default()
    })?;

    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let activities = parse_activities(&content)?;

    if args.in_memory {
        config.storage.backend = StorageKind::Memory;
    }
    let (broker, history) = crate::open_broker(&config).await?;
    let forwarder = Arc::new(BrokerForwarder::new(Arc::clone(&broker)));
    let outbound = Arc::new(RecordingOutbound::new());
    let relay = Relay::new(Arc::clone(&broker), forwarder, outbound.clone(), &config);

    for (line, activity) in &activities {
        match relay.handle_activity(activity).await {
            Ok(action) => println!("line {line}: {}", action.kind()),
            Err(e) => {
                warn!(line, error = %e, "activity failed");
                println!("line {line}: error: {e}");
            },
        }
    }

    let sent = outbound.sent();
    println!("\n{} outbound message(s)", sent.len());
    for message in &sent {
        println!("  -> {}: {}", message.to, message.text);
    }

    if args.history {
        let outcomes: Vec<_> = history.entries().into_iter().map(|e| e.outcome).collect();
        println!("\nOutcome history:");
        output.outcomes(&outcomes)?;
    }

    #[cfg(feature = "metrics")]
    {
        if args.metrics {
            print!("\n{}", metrics.render());
        }
    }

    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines_and_comments() {
        let content = r#"
# agent opens the queue
{"type":"message","text":"/watch"}

{"type":"conversationUpdate"}
"#;
        let parsed = parse_activities(content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, 3);
        assert!(parsed[0].1.is_message());
        assert!(!parsed[1].1.is_message());
    }

    #[test]
    fn reports_line_of_bad_json() {
        let err = parse_activities("{\"type\":\"message\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn replays_a_file_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let line = |account: &str, conversation: &str, text: &str| {
            serde_json::json!({
                "type": "message",
                "text": text,
                "serviceUrl": "https://smba.example/",
                "channelId": "msteams",
                "from": { "id": account },
                "recipient": { "id": "28:parley" },
                "conversation": { "id": conversation }
            })
            .to_string()
        };
        let content = [
            line("29:agent", "support", "/watch"),
            line("29:alice", "dm-alice", "hello"),
            line("29:agent", "support", "/accept"),
        ]
        .join("\n");
        std::fs::write(&path, content).unwrap();

        let args = ReplayArgs {
            file: path,
            in_memory: true,
            history: true,
            #[cfg(feature = "metrics")]
            metrics: false,
        };
        handle_replay(args, ParleyConfig::default(), Output { json: false })
            .await
            .unwrap();
    }
}
