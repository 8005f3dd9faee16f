mod config_commands;
mod party_commands;
mod replay_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    parley_config::{ParleyConfig, StorageKind},
    parley_routing::{
        ConnectionBroker, ConnectionProfile, InMemoryBackend, OutcomeHistory, PartyCategory,
        SqliteBackend, StorageBackend,
    },
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parley", about = "Parley: party registry and 1:1 connection broker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: discover parley.{toml,yaml,yml,json}).
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL (overrides `storage.database_url` and forces SQLite).
    #[arg(long, global = true, env = "PARLEY_DATABASE_URL")]
    database_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List known parties.
    Parties {
        /// Only this category (user, bot, aggregation, pending_request).
        #[arg(long)]
        category: Option<PartyCategory>,
    },
    /// List pending connection requests, oldest first.
    Requests,
    /// List established connections.
    Connections,
    /// File a connection request for a known user.
    Request(party_commands::PartyArgs),
    /// Withdraw a pending request.
    Cancel(party_commands::PartyArgs),
    /// Connect an owner to a client.
    Connect {
        /// Conversation id of the owner (usually an agent).
        #[arg(long)]
        owner: String,
        #[arg(long)]
        owner_account: Option<String>,
        /// Conversation id of the client (usually the requesting user).
        #[arg(long)]
        client: String,
        #[arg(long)]
        client_account: Option<String>,
    },
    /// End the connections a party takes part in.
    Disconnect {
        #[command(flatten)]
        party: party_commands::PartyArgs,
        /// Which side the party is on (owner, client, any).
        #[arg(long, default_value = "any")]
        profile: ConnectionProfile,
    },
    /// Remove every trace of a party's account.
    Remove(party_commands::PartyArgs),
    /// Delete all parties and connections.
    Reset {
        /// Skip the confirmation guard.
        #[arg(long)]
        yes: bool,
    },
    /// Feed a JSON-lines file of Bot Framework activities through the relay.
    Replay(replay_commands::ReplayArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ParleyConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => parley_config::load_config(path)?,
        None => parley_config::discover_and_load(),
    };
    if let Some(url) = &cli.database_url {
        config.storage.backend = StorageKind::Sqlite;
        config.storage.database_url = url.clone();
    }
    Ok(config)
}

async fn open_backend(config: &ParleyConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage.backend {
        StorageKind::Memory => {
            warn!("using in-memory storage; nothing is persisted");
            Ok(Arc::new(InMemoryBackend::new()))
        },
        StorageKind::Sqlite => {
            let backend = SqliteBackend::new(&config.storage.database_url)
                .await
                .with_context(|| format!("opening {}", config.storage.database_url))?;
            Ok(Arc::new(backend))
        },
    }
}

/// Broker over the configured backend, reporting into a fresh history.
async fn open_broker(
    config: &ParleyConfig,
) -> anyhow::Result<(Arc<ConnectionBroker>, Arc<OutcomeHistory>)> {
    let backend = open_backend(config).await?;
    let history = Arc::new(OutcomeHistory::new(config.broker.history_capacity));
    let broker = ConnectionBroker::new(backend).with_observer(history.clone());
    Ok((Arc::new(broker), history))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    if let Commands::Config { action } = &cli.command {
        return config_commands::handle_config(action, cli.config.as_deref());
    }

    let config = load_config(&cli)?;
    let output = party_commands::Output { json: cli.json };

    match cli.command {
        Commands::Replay(args) => replay_commands::handle_replay(args, config, output).await,
        command => {
            let (broker, _history) = open_broker(&config).await?;
            let registry = broker.registry();
            match command {
                Commands::Parties { category } => {
                    party_commands::list_parties(registry, category, output).await
                },
                Commands::Requests => {
                    party_commands::list_parties(
                        registry,
                        Some(PartyCategory::PendingRequest),
                        output,
                    )
                    .await
                },
                Commands::Connections => party_commands::list_connections(registry, output).await,
                Commands::Request(party) => {
                    let requestor = party.resolve(registry, PartyCategory::User).await?;
                    let outcome = broker
                        .request_connection(&requestor, config.broker.reject_if_no_aggregation)
                        .await?;
                    output.outcomes(&[outcome])
                },
                Commands::Cancel(party) => {
                    let requestor = party
                        .resolve(registry, PartyCategory::PendingRequest)
                        .await?;
                    output.outcomes(&[broker.cancel_request(&requestor).await?])
                },
                Commands::Connect {
                    owner,
                    owner_account,
                    client,
                    client_account,
                } => {
                    let owner = party_commands::PartyArgs::new(owner, owner_account)
                        .resolve(registry, PartyCategory::User)
                        .await?;
                    let client = party_commands::PartyArgs::new(client, client_account)
                        .resolve(registry, PartyCategory::User)
                        .await?;
                    output.outcomes(&[broker.connect(&owner, &client).await?])
                },
                Commands::Disconnect { party, profile } => {
                    let identity = party.resolve(registry, PartyCategory::User).await?;
                    output.outcomes(&broker.disconnect(&identity, profile).await?)
                },
                Commands::Remove(party) => {
                    let identity = party.resolve(registry, PartyCategory::User).await?;
                    output.outcomes(&broker.remove_party(&identity).await?)
                },
                Commands::Reset { yes } => {
                    if !yes {
                        anyhow::bail!("refusing to delete everything without --yes");
                    }
                    registry.delete_all().await?;
                    println!("All parties and connections deleted.");
                    Ok(())
                },
                Commands::Replay(_) | Commands::Config { .. } => Ok(()),
            }
        },
    }
}
