//! Party registry and 1:1 connection broker.
//!
//! Parties are conversation-scoped participant addresses, kept in four
//! categories: users, bot instances, aggregation channels (request queues
//! watched by agents) and pending requests. The broker moves parties through
//! `Unconnected -> PendingRequest -> Connected` and back, reporting every
//! decision as an [`Outcome`].
//!
//! Storage is pluggable through [`StorageBackend`]; an in-memory and a SQLite
//! implementation are bundled.

pub mod broker;
pub mod error;
pub mod forwarder;
pub mod history;
pub mod identity;
pub mod outcome;
pub mod registry;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    broker::{ClockFn, ConnectionBroker, now_ms},
    error::{Error, Result, ValidationError},
    forwarder::{BrokerForwarder, MessageForwarder},
    history::{HistoryEntry, OutcomeHistory, OutcomeObserver},
    identity::PartyIdentity,
    outcome::{ConnectionProfile, ErrorReason, Outcome, RejectReason},
    registry::PartyRegistry,
    store::{Connection, PartyCategory, StorageBackend},
    store_memory::InMemoryBackend,
    store_sqlite::SqliteBackend,
};

/// Run database migrations for the registry tables.
///
/// Creates the `parties` and `connections` tables. Call this at startup when
/// sharing a pool with [`SqliteBackend::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
