//! Permission synthesis from a free-text agent description
//!
//! `AuthorityGenerator` is the seam; `KeywordAuthority` is the keyword
//! heuristic used by default. A rule engine can replace it without touching
//! the gatekeeper.

use serde::{Deserialize, Serialize};

use super::registry::{Permission, PermissionMap, PermissionValue};

/// Description of the agent asking for authority
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    /// Client id of the agent, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// What the agent says it needs to do
    pub context_text: String,
}

impl AgentContext {
    pub fn new(context_text: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            context_text: context_text.into(),
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Turns an agent description into a permission for each known key
pub trait AuthorityGenerator: Send + Sync {
    fn generate(&self, agent: &AgentContext, keys: &[String]) -> PermissionMap;
}

const READ_ONLY_TERMS: &[&str] = &["read-only", "read only", "view"];
const EDIT_TERMS: &[&str] = &["update", "edit"];
const FULL_ACCESS_TERMS: &[&str] = &["full access", "admin"];
const SENSITIVE_TERMS: &[&str] = &["sensitive", "private", "secret"];
const PUBLIC_TERMS: &[&str] = &["public", "shared"];

/// Keyword heuristic
///
/// Per key, in order:
/// 1. start at `{Ask, Never}`
/// 2. "read-only"/"view" -> `{Allow, Never}`
/// 3. "update"/"edit" -> `{Allow, Ask}`
/// 4. "full access"/"admin" -> `{Allow, Allow}`
/// 5. key named "public"/"shared" -> read `Allow`
/// 6. text contains the literal key -> read `Allow`; "modify <key>"/"update <key>" -> write `Allow`
/// 7. key named "sensitive"/"private"/"secret" -> `{Never, Never}`, overriding all of the above
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAuthority;

impl KeywordAuthority {
    pub fn new() -> Self {
        Self
    }

    fn permission_for(&self, text: &str, key: &str) -> Permission {
        use PermissionValue::{Allow, Ask, Never};

        let key_lower = key.to_lowercase();
        let mut permission = Permission::new(Ask, Never);

        if contains_any(text, READ_ONLY_TERMS) {
            permission = Permission::new(Allow, Never);
        }
        if contains_any(text, EDIT_TERMS) {
            permission = Permission::new(Allow, Ask);
        }
        if contains_any(text, FULL_ACCESS_TERMS) {
            permission = Permission::allow_all();
        }

        if contains_any(&key_lower, PUBLIC_TERMS) {
            permission.read = Allow;
        }

        // The key must appear verbatim; a leaf name alone is too ambiguous
        if text.contains(key_lower.as_str()) {
            permission.read = Allow;
            let wants_write = text.contains(&format!("modify {key_lower}"))
                || text.contains(&format!("update {key_lower}"));
            if wants_write {
                permission.write = Allow;
            }
        }

        if contains_any(&key_lower, SENSITIVE_TERMS) {
            permission = Permission::deny_all();
        }

        permission
    }
}

impl AuthorityGenerator for KeywordAuthority {
    fn generate(&self, agent: &AgentContext, keys: &[String]) -> PermissionMap {
        let text = agent.context_text.to_lowercase();
        let map: PermissionMap = keys
            .iter()
            .map(|key| (key.clone(), self.permission_for(&text, key)))
            .collect();

        tracing::debug!(
            agent_id = agent.agent_id.as_deref().unwrap_or("-"),
            keys = map.len(),
            "Generated authority from agent context"
        );
        map
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
