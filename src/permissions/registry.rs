//! Permission registry implementation
//!
//! Stores a `(read, write)` tri-state pair per dot-path key and resolves the
//! effective permission against the process-wide `DefaultPolicy`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::GatekeeperError;

/// One half of a permission pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionValue {
    /// Access without asking
    Allow,
    /// Access needs the user's approval
    Ask,
    /// Never allowed
    Never,
}

impl PermissionValue {
    pub fn is_allow(self) -> bool {
        self == PermissionValue::Allow
    }
}

impl fmt::Display for PermissionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionValue::Allow => write!(f, "Allow"),
            PermissionValue::Ask => write!(f, "Ask"),
            PermissionValue::Never => write!(f, "Never"),
        }
    }
}

/// Read/write permission for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub read: PermissionValue,
    pub write: PermissionValue,
}

impl Permission {
    pub const fn new(read: PermissionValue, write: PermissionValue) -> Self {
        Self { read, write }
    }

    /// `{Allow, Allow}`
    pub const fn allow_all() -> Self {
        Self::new(PermissionValue::Allow, PermissionValue::Allow)
    }

    /// `{Ask, Ask}`
    pub const fn ask_all() -> Self {
        Self::new(PermissionValue::Ask, PermissionValue::Ask)
    }

    /// `{Never, Never}`
    pub const fn deny_all() -> Self {
        Self::new(PermissionValue::Never, PermissionValue::Never)
    }

    /// Check if either half is `Allow`
    pub fn has_allow(&self) -> bool {
        self.read.is_allow() || self.write.is_allow()
    }
}

/// Map of key -> permission
pub type PermissionMap = BTreeMap<String, Permission>;

/// Process-wide fallback policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Everything is readable and writable
    ShareEverything,
    /// Stored permissions apply; unknown keys need approval
    #[default]
    AskPermission,
    /// Only keys with an explicit `Allow` are accessible
    AllowList,
}

impl DefaultPolicy {
    /// Permission used for keys with no stored entry
    pub fn structural_default(self) -> Permission {
        match self {
            DefaultPolicy::ShareEverything => Permission::allow_all(),
            DefaultPolicy::AskPermission => Permission::ask_all(),
            DefaultPolicy::AllowList => Permission::deny_all(),
        }
    }
}

impl fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultPolicy::ShareEverything => write!(f, "share_everything"),
            DefaultPolicy::AskPermission => write!(f, "ask_permission"),
            DefaultPolicy::AllowList => write!(f, "allow_list"),
        }
    }
}

impl FromStr for DefaultPolicy {
    type Err = GatekeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "shareeverything" => Ok(DefaultPolicy::ShareEverything),
            "askpermission" => Ok(DefaultPolicy::AskPermission),
            "allowlist" => Ok(DefaultPolicy::AllowList),
            _ => Err(GatekeeperError::InvalidConfig(format!("unknown default policy: {s:?}"))),
        }
    }
}

/// Stored permissions plus the active default policy
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    stored: PermissionMap,
    policy: DefaultPolicy,
}

impl PermissionRegistry {
    /// Create an empty registry with the given policy
    pub fn new(policy: DefaultPolicy) -> Self {
        Self {
            stored: PermissionMap::new(),
            policy,
        }
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.policy
    }

    pub fn set_default_policy(&mut self, policy: DefaultPolicy) {
        if self.policy != policy {
            tracing::info!(from = %self.policy, to = %policy, "Default policy changed");
        }
        self.policy = policy;
    }

    /// Resolve the effective permission for a key
    ///
    /// - `ShareEverything`: always `{Allow, Allow}`, stored values ignored
    /// - `AllowList`: the stored value only if it contains an `Allow`,
    ///   otherwise `{Never, Never}`
    /// - `AskPermission`: the stored value, or `{Ask, Ask}`
    pub fn get_permission(&self, key: &str) -> Permission {
        match self.policy {
            DefaultPolicy::ShareEverything => Permission::allow_all(),
            DefaultPolicy::AllowList => match self.stored.get(key) {
                Some(permission) if permission.has_allow() => *permission,
                _ => Permission::deny_all(),
            },
            DefaultPolicy::AskPermission => self
                .stored
                .get(key)
                .copied()
                .unwrap_or_else(|| self.policy.structural_default()),
        }
    }

    /// The stored entry for a key, ignoring the policy
    pub fn stored(&self, key: &str) -> Option<Permission> {
        self.stored.get(key).copied()
    }

    fn stored_or_default(&self, key: &str) -> Permission {
        self.stored(key)
            .unwrap_or_else(|| self.policy.structural_default())
    }

    /// Set both halves of a key's permission
    pub fn set_permission(&mut self, key: impl Into<String>, permission: Permission) {
        let key = key.into();
        tracing::info!(
            key = %key,
            read = %permission.read,
            write = %permission.write,
            "Setting permission"
        );
        self.stored.insert(key, permission);
    }

    /// Set only the read half, keeping the current write half
    pub fn set_read_permission(&mut self, key: impl Into<String>, value: PermissionValue) {
        let key = key.into();
        let current = self.stored_or_default(&key);
        self.set_permission(key, Permission::new(value, current.write));
    }

    /// Set only the write half, keeping the current read half
    pub fn set_write_permission(&mut self, key: impl Into<String>, value: PermissionValue) {
        let key = key.into();
        let current = self.stored_or_default(&key);
        self.set_permission(key, Permission::new(current.read, value));
    }

    /// Store many permissions at once
    pub fn extend(&mut self, permissions: PermissionMap) {
        for (key, permission) in permissions {
            self.set_permission(key, permission);
        }
    }

    /// Give every key without a stored entry the policy's structural default
    ///
    /// Returns the keys that were filled in.
    pub fn initialize_defaults<I, S>(&mut self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default = self.policy.structural_default();
        let mut filled = Vec::new();
        for key in keys {
            let key = key.into();
            if !self.stored.contains_key(&key) {
                self.stored.insert(key.clone(), default);
                filled.push(key);
            }
        }
        tracing::info!(count = filled.len(), policy = %self.policy, "Initialized default permissions");
        filled
    }

    /// Keys whose read permission resolves to `Allow`
    ///
    /// This is the boolean "allowed sections" view derived from the
    /// tri-state permissions.
    pub fn allowed_sections<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .filter(|key| self.get_permission(key).read.is_allow())
            .map(str::to_string)
            .collect()
    }

    /// Stored keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.stored.keys().map(String::as_str)
    }

    /// Copy of all stored permissions
    pub fn snapshot(&self) -> PermissionMap {
        self.stored.clone()
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }
}
