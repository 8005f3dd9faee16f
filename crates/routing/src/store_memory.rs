//! In-memory storage backend.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    identity::PartyIdentity,
    store::{Connection, PartyCategory, PartyPredicate, StorageBackend},
};

/// In-memory backend backed by insertion-ordered `Vec`s. No persistence.
///
/// Each primitive runs under a single lock, which is what makes
/// insert-if-absent and delete-if-present atomic.
pub struct InMemoryBackend {
    parties: Mutex<HashMap<PartyCategory, Vec<PartyIdentity>>>,
    connections: Mutex<Vec<Connection>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            parties: Mutex::new(HashMap::new()),
            connections: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn insert(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
        let mut parties = self.parties.lock().unwrap_or_else(|e| e.into_inner());
        let entries = parties.entry(category).or_default();
        if entries.contains(identity) {
            return Ok(false);
        }
        entries.push(identity.clone());
        Ok(true)
    }

    async fn delete(&self, category: PartyCategory, identity: &PartyIdentity) -> Result<bool> {
        let mut parties = self.parties.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = parties.get_mut(&category) else {
            return Ok(false);
        };
        match entries.iter().position(|p| p == identity) {
            Some(idx) => {
                entries.remove(idx);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn query(
        &self,
        category: PartyCategory,
        predicate: PartyPredicate<'_>,
    ) -> Result<Vec<PartyIdentity>> {
        let parties = self.parties.lock().unwrap_or_else(|e| e.into_inner());
        Ok(parties
            .get(&category)
            .map(|entries| entries.iter().filter(|p| predicate(*p)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_connection(
        &self,
        owner: &PartyIdentity,
        client: &PartyIdentity,
    ) -> Result<bool> {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if connections.iter().any(|c| &c.owner == owner) {
            return Ok(false);
        }
        connections.push(Connection::new(owner.clone(), client.clone()));
        Ok(true)
    }

    async fn delete_connection(&self, owner: &PartyIdentity) -> Result<Option<PartyIdentity>> {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(connections
            .iter()
            .position(|c| &c.owner == owner)
            .map(|idx| connections.remove(idx).client))
    }

    async fn remove_connection(&self, connection: &Connection) -> Result<bool> {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        match connections.iter().position(|c| c == connection) {
            Some(idx) => {
                connections.remove(idx);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn query_connections(&self) -> Result<Vec<Connection>> {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(connections.clone())
    }

    async fn delete_all(&self) -> Result<()> {
        self.parties
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}
