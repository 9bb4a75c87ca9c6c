//! Bounded audit trail
//!
//! Every gatekeeper decision, allowed or denied, lands here. The log is a
//! ring buffer: once `capacity` is reached the oldest entry is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::gatekeeper::AccessAction;

/// Default number of retained entries
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// One recorded access decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Id of the request this entry records
    pub request_id: String,

    /// When the decision was made
    pub timestamp: DateTime<Utc>,

    pub client_id: String,

    pub action: AccessAction,

    /// Sections the request touched (after middleware rewrites)
    #[serde(default)]
    pub sections: Vec<String>,

    pub success: bool,

    /// Deny reason, when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Time spent on the request
    pub duration_ms: u64,

    /// Opaque request metadata, echoed from the request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Filter for `AuditLog::query`
///
/// Every field is optional; `None` matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub client_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub action: Option<AccessAction>,
    pub success: Option<bool>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn action(mut self, action: AccessAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Check if an entry passes the filter (bounds are inclusive)
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.client_id.as_ref().map_or(true, |id| *id == entry.client_id)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
            && self.action.map_or(true, |action| action == entry.action)
            && self.success.map_or(true, |success| success == entry.success)
    }
}

/// Append-only, capacity-bounded log of decisions
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl AuditLog {
    /// Create a log that keeps at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest ones past capacity
    pub fn append(&mut self, entry: AuditEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Copy of the entries matching `filter`, oldest first
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Copy of every entry, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.back()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(n: usize, client: &str, success: bool, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            request_id: format!("req-{n}"),
            timestamp: at,
            client_id: client.to_string(),
            action: AccessAction::Read,
            sections: Vec::new(),
            success,
            reason: (!success).then(|| "rate limit exceeded".to_string()),
            duration_ms: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_capacity_keeps_newest_in_order() {
        let mut log = AuditLog::default();
        let now = Utc::now();
        for n in 0..1500 {
            log.append(entry(n, "c", true, now));
        }

        assert_eq!(log.len(), 1000);
        let entries = log.entries();
        assert_eq!(entries.first().unwrap().request_id, "req-500");
        assert_eq!(entries.last().unwrap().request_id, "req-1499");
        assert!(entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.request_id == format!("req-{}", 500 + i)));
    }

    #[test]
    fn test_query_filters() {
        let mut log = AuditLog::new(10);
        let t0 = Utc::now();
        log.append(entry(0, "alice", true, t0));
        log.append(entry(1, "bob", false, t0 + Duration::seconds(10)));
        log.append(entry(2, "alice", false, t0 + Duration::seconds(20)));

        assert_eq!(log.query(&AuditFilter::new().client("alice")).len(), 2);
        assert_eq!(log.query(&AuditFilter::new().success(false)).len(), 2);

        let window = AuditFilter::new()
            .since(t0 + Duration::seconds(5))
            .until(t0 + Duration::seconds(15));
        let hits = log.query(&window);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].client_id, "bob");
    }

    #[test]
    fn test_query_returns_copies() {
        let mut log = AuditLog::new(10);
        log.append(entry(0, "alice", true, Utc::now()));

        let mut copy = log.query(&AuditFilter::new());
        copy[0].client_id = "mallory".to_string();

        assert_eq!(log.entries()[0].client_id, "alice");
    }
}
