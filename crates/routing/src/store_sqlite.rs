//! SQLite-backed storage using sqlx.
//!
//! Identities are stored as JSON next to their [`PartyIdentity::key`], and the
//! uniqueness constraints on `(category, party_key)` and `owner_key` are what
//! make the primitives atomic across concurrent callers. Connections also
//! carry `client_key` so a pair can be removed only while it still holds.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    error::Context,
    identity::PartyIdentity,
    store::{Connection, PartyCategory, PartyPredicate, StorageBackend},
};

/// SQLite-backed persistence for the party registry.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a backend with its own connection pool and run migrations.
    ///
    /// For a pool shared with other tables, use [`SqliteBackend::with_pool`]
    /// after calling [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        // An in-memory database lives per connection; keep exactly one so
        // every query sees the same tables.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a backend using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn insert(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
        let data = serde_json::to_string(identity)?;
        let result =
            sqlx::query("INSERT OR IGNORE INTO parties (category, party_key, data) VALUES (?, ?, ?)")
                .bind(category.as_str())
                .bind(identity.key())
                .bind(&data)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
        let result = sqlx::query("DELETE FROM parties WHERE category = ? AND party_key = ?")
            .bind(category.as_str())
            .bind(identity.key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(
        &self,
        category: PartyCategory,
        predicate: PartyPredicate<'_>,
    ) -> Result<Vec<PartyIdentity>> {
        let rows = sqlx::query("SELECT data FROM parties WHERE category = ? ORDER BY seq")
            .bind(category.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut parties = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.get("data");
            let party: PartyIdentity = serde_json::from_str(&data)?;
            if predicate(&party) {
                parties.push(party);
            }
        }
        Ok(parties)
    }

    async fn insert_connection(
        &self,
        owner: &PartyIdentity,
        client: &PartyIdentity,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO connections (owner_key, client_key, owner, client) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(owner.key())
        .bind(client.key())
        .bind(serde_json::to_string(owner)?)
        .bind(serde_json::to_string(client)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_connection(&self, owner: &PartyIdentity) -> Result<Option<PartyIdentity>> {
        let client = sqlx::query_scalar::<_, String>(
            "DELETE FROM connections WHERE owner_key = ? RETURNING client",
        )
        .bind(owner.key())
        .fetch_optional(&self.pool)
        .await?;
        client
            .map(|data| serde_json::from_str(&data).map_err(Into::into))
            .transpose()
    }

    async fn remove_connection(&self, connection: &Connection) -> Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE owner_key = ? AND client_key = ?")
            .bind(connection.owner.key())
            .bind(connection.client.key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_connections(&self) -> Result<Vec<Connection>> {
        let rows = sqlx::query("SELECT owner, client FROM connections ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        let mut connections = Vec::with_capacity(rows.len());
        for row in rows {
            let owner: String = row.get("owner");
            let client: String = row.get("client");
            connections.push(Connection::new(
                serde_json::from_str(&owner)?,
                serde_json::from_str(&client)?,
            ));
        }
        Ok(connections)
    }

    async fn delete_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM connections")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM parties").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
