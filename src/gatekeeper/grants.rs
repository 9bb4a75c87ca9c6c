//! Client grants
//!
//! A grant scopes a client to an explicit set of sections, optionally until
//! an expiry time. Clients without a grant fall back to default-policy
//! evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::core::DenyReason;

/// Sections a client is explicitly allowed to touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub client_id: String,

    pub allowed_sections: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub granted_at: DateTime<Utc>,
}

impl Grant {
    pub fn new<I, S>(client_id: impl Into<String>, allowed_sections: I, granted_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            allowed_sections: allowed_sections.into_iter().map(Into::into).collect(),
            expires_at: None,
            granted_at,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if the grant has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Check a request's sections against the grant
    ///
    /// Containment is exact: a grant for `preferences` does not cover
    /// `preferences.budget`. An empty section list passes.
    pub fn check(&self, sections: &[String], now: DateTime<Utc>) -> Result<(), DenyReason> {
        if self.is_expired(now) {
            return Err(DenyReason::GrantExpired);
        }
        if sections.iter().all(|section| self.allowed_sections.contains(section)) {
            Ok(())
        } else {
            Err(DenyReason::GrantInsufficient)
        }
    }
}

/// Grants keyed by client id
#[derive(Debug, Clone, Default)]
pub struct GrantStore {
    grants: HashMap<String, Grant>,
}

impl GrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a grant, replacing any previous grant for the client
    pub fn insert(&mut self, grant: Grant) {
        tracing::info!(
            client_id = %grant.client_id,
            sections = grant.allowed_sections.len(),
            expires_at = ?grant.expires_at,
            "Granting access"
        );
        self.grants.insert(grant.client_id.clone(), grant);
    }

    pub fn get(&self, client_id: &str) -> Option<&Grant> {
        self.grants.get(client_id)
    }

    pub fn revoke(&mut self, client_id: &str) -> Option<Grant> {
        let removed = self.grants.remove(client_id);
        if removed.is_some() {
            tracing::info!(client_id = %client_id, "Grant revoked");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
