//! Client registry
//!
//! Clients are never deleted. Revocation is a terminal status transition so
//! the audit trail keeps pointing at a known identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::{GatekeeperError, GatekeeperResult};

/// Id of the built-in fully trusted client
pub const SYSTEM_CLIENT_ID: &str = "system";

/// Lifecycle status of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Suspended,
    Revoked,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Active => write!(f, "active"),
            ClientStatus::Suspended => write!(f, "suspended"),
            ClientStatus::Revoked => write!(f, "revoked"),
        }
    }
}

/// Kind of caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Assistant,
    #[default]
    Agent,
    Service,
    System,
}

/// What a client may attempt at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientCapability {
    Read,
    Write,
    Execute,
    /// Skips grant and policy evaluation
    Admin,
}

impl ClientCapability {
    pub const ALL: [ClientCapability; 4] = [
        ClientCapability::Read,
        ClientCapability::Write,
        ClientCapability::Execute,
        ClientCapability::Admin,
    ];
}

/// A registered caller identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    #[serde(default)]
    pub status: ClientStatus,
    pub capabilities: BTreeSet<ClientCapability>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl Client {
    /// Create an active client with read and write capabilities
    pub fn new(id: impl Into<String>, name: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client_type,
            status: ClientStatus::Active,
            capabilities: [ClientCapability::Read, ClientCapability::Write]
                .into_iter()
                .collect(),
            access_count: 0,
            last_accessed_at: None,
        }
    }

    /// The built-in system client with every capability
    pub fn system() -> Self {
        Self::new(SYSTEM_CLIENT_ID, "System", ClientType::System)
            .with_capabilities(ClientCapability::ALL)
    }

    /// Replace the capability set
    pub fn with_capabilities<I>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = ClientCapability>,
    {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// Add one capability
    pub fn with_capability(mut self, capability: ClientCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn has_capability(&self, capability: ClientCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }
}

/// Known clients keyed by id
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a client
    ///
    /// New clients start active with a zero access count. Re-registering a
    /// known id updates its name, type and capabilities but keeps its status
    /// and usage counters, so a revoked client stays revoked.
    pub fn register(&mut self, client: Client) -> &Client {
        let id = client.id.clone();
        match self.clients.get_mut(&id) {
            Some(existing) => {
                tracing::info!(client_id = %id, "Updating client registration");
                existing.name = client.name;
                existing.client_type = client.client_type;
                existing.capabilities = client.capabilities;
            }
            None => {
                tracing::info!(client_id = %id, client_type = ?client.client_type, "Registering client");
                self.clients.insert(
                    id.clone(),
                    Client {
                        status: ClientStatus::Active,
                        access_count: 0,
                        last_accessed_at: None,
                        ..client
                    },
                );
            }
        }
        &self.clients[&id]
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Move a client to a new status
    ///
    /// `Revoked` is terminal: any further transition fails.
    pub fn set_status(&mut self, id: &str, status: ClientStatus) -> GatekeeperResult<()> {
        let client = self
            .clients
            .get_mut(id)
            .ok_or_else(|| GatekeeperError::ClientNotFound(id.to_string()))?;

        if client.status == ClientStatus::Revoked && status != ClientStatus::Revoked {
            return Err(GatekeeperError::ClientRevoked(id.to_string()));
        }

        if client.status != status {
            tracing::info!(client_id = %id, from = %client.status, to = %status, "Client status changed");
        }
        client.status = status;
        Ok(())
    }

    pub fn suspend(&mut self, id: &str) -> GatekeeperResult<()> {
        self.set_status(id, ClientStatus::Suspended)
    }

    pub fn reactivate(&mut self, id: &str) -> GatekeeperResult<()> {
        self.set_status(id, ClientStatus::Active)
    }

    pub fn revoke(&mut self, id: &str) -> GatekeeperResult<()> {
        self.set_status(id, ClientStatus::Revoked)
    }

    /// Count a successful access
    pub fn record_access(&mut self, id: &str, at: DateTime<Utc>) {
        if let Some(client) = self.clients.get_mut(id) {
            client.access_count += 1;
            client.last_accessed_at = Some(at);
        }
    }

    /// Copy of every client
    pub fn list(&self) -> Vec<Client> {
        self.clients.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
