//! Request and response types for the gatekeeper

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::core::ContextNode;

/// What a request wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Read,
    Write,
    Execute,
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessAction::Read => write!(f, "read"),
            AccessAction::Write => write!(f, "write"),
            AccessAction::Execute => write!(f, "execute"),
        }
    }
}

/// A request for context access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub client_id: String,

    pub action: AccessAction,

    /// Dot-paths; empty means unrestricted for reads
    #[serde(default)]
    pub sections: Vec<String>,

    /// Payload for writes (must be an object) or input for execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ContextNode>,

    /// Capability name for execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    /// Opaque, echoed into the audit entry
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl AccessRequest {
    /// Create a request with no sections, data or capability
    pub fn new(client_id: impl Into<String>, action: AccessAction) -> Self {
        Self {
            client_id: client_id.into(),
            action,
            sections: Vec::new(),
            data: None,
            capability: None,
            metadata: HashMap::new(),
        }
    }

    /// Read the given sections
    pub fn read<I, S>(client_id: impl Into<String>, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(client_id, AccessAction::Read).with_sections(sections)
    }

    /// Merge `data` into the context
    pub fn write(client_id: impl Into<String>, data: ContextNode) -> Self {
        Self::new(client_id, AccessAction::Write).with_data(data)
    }

    /// Invoke a named capability
    pub fn execute(client_id: impl Into<String>, capability: impl Into<String>) -> Self {
        let mut request = Self::new(client_id, AccessAction::Execute);
        request.capability = Some(capability.into());
        request
    }

    pub fn with_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections = sections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, data: ContextNode) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Metadata attached to every response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub client_id: String,

    /// RFC 3339 / ISO 8601 timestamp of the decision
    pub timestamp: String,

    pub request_id: String,

    pub action: AccessAction,

    pub duration_ms: u64,
}

/// Uniform result of a request
///
/// Denials of every kind share this shape; only `error` tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ContextNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub metadata: ResponseMetadata,
}

impl AccessResponse {
    pub(crate) fn allowed(data: Option<ContextNode>, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata,
        }
    }

    pub(crate) fn denied(reason: String, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(reason),
            metadata,
        }
    }
}

pub(crate) fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
