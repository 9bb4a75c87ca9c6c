//! Gatekeeper configuration
//!
//! The only externally tunable parameters are the default policy, the rate
//! limit window, the capability timeout and the audit capacity.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{GatekeeperError, GatekeeperResult};
use crate::permissions::DefaultPolicy;

/// Sliding-window rate limit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum requests per (client, action) inside one window
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_limit() -> usize {
    100
}

fn default_capability_timeout_ms() -> u64 {
    30_000
}

fn default_audit_capacity() -> usize {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            limit: default_limit(),
        }
    }
}

impl RateLimitConfig {
    /// Create a rate limit of `limit` requests per `window_ms`
    pub fn new(window_ms: u64, limit: usize) -> Self {
        Self { window_ms, limit }
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Top-level gatekeeper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Policy applied when no explicit permission is stored
    #[serde(default)]
    pub default_policy: DefaultPolicy,

    /// Rate limit per (client, action)
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upper bound on a single capability handler call
    #[serde(default = "default_capability_timeout_ms")]
    pub capability_timeout_ms: u64,

    /// Number of audit entries retained
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            default_policy: DefaultPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            capability_timeout_ms: default_capability_timeout_ms(),
            audit_capacity: default_audit_capacity(),
        }
    }
}

impl GatekeeperConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> GatekeeperResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from defaults plus `GATEKEEPER_*` environment overrides
    pub fn from_env() -> GatekeeperResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (env in production, a map in tests)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> GatekeeperResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(policy) = lookup("GATEKEEPER_DEFAULT_POLICY") {
            self.default_policy = policy.parse()?;
        }
        if let Some(window) = lookup("GATEKEEPER_RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_number("GATEKEEPER_RATE_LIMIT_WINDOW_MS", &window)?;
        }
        if let Some(limit) = lookup("GATEKEEPER_RATE_LIMIT") {
            self.rate_limit.limit = parse_number("GATEKEEPER_RATE_LIMIT", &limit)?;
        }
        if let Some(timeout) = lookup("GATEKEEPER_CAPABILITY_TIMEOUT_MS") {
            self.capability_timeout_ms = parse_number("GATEKEEPER_CAPABILITY_TIMEOUT_MS", &timeout)?;
        }
        if let Some(capacity) = lookup("GATEKEEPER_AUDIT_CAPACITY") {
            self.audit_capacity = parse_number("GATEKEEPER_AUDIT_CAPACITY", &capacity)?;
        }
        Ok(())
    }

    /// Reject settings that would make the gatekeeper unusable
    pub fn validate(&self) -> GatekeeperResult<()> {
        if self.rate_limit.window_ms == 0 {
            return Err(GatekeeperError::InvalidConfig("rate_limit.window_ms must be > 0".into()));
        }
        if self.rate_limit.limit == 0 {
            return Err(GatekeeperError::InvalidConfig("rate_limit.limit must be > 0".into()));
        }
        if self.capability_timeout_ms == 0 {
            return Err(GatekeeperError::InvalidConfig("capability_timeout_ms must be > 0".into()));
        }
        if self.audit_capacity == 0 {
            return Err(GatekeeperError::InvalidConfig("audit_capacity must be > 0".into()));
        }
        Ok(())
    }

    /// Set the default policy
    pub fn with_default_policy(mut self, policy: DefaultPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Set the rate limit
    pub fn with_rate_limit(mut self, window_ms: u64, limit: usize) -> Self {
        self.rate_limit = RateLimitConfig::new(window_ms, limit);
        self
    }

    /// Set the capability handler timeout
    pub fn with_capability_timeout(mut self, timeout_ms: u64) -> Self {
        self.capability_timeout_ms = timeout_ms;
        self
    }

    /// Set the audit capacity
    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    /// Get the capability timeout as Duration
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> GatekeeperResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| GatekeeperError::InvalidConfig(format!("{name}: not a number: {raw:?}")))
}
