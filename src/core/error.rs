//! Gatekeeper error types
//!
//! Two families live here:
//! - `GatekeeperError` for the administrative surface, which fails fast
//! - `DenyReason` for the request path, which never returns `Err` and
//!   instead reports a denial inside the `AccessResponse`

use thiserror::Error;

use crate::clients::ClientStatus;

/// Errors returned by administrative operations
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Malformed dot-path
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// Client id is not registered
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// Client has been revoked and cannot change status again
    #[error("Client revoked: {0}")]
    ClientRevoked(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl GatekeeperError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        GatekeeperError::Other(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        GatekeeperError::InvalidPath(path.into())
    }
}

/// Result type alias for administrative operations
pub type GatekeeperResult<T> = Result<T, GatekeeperError>;

/// Why a request was denied
///
/// The `Display` output is the exact reason string placed in
/// `AccessResponse::error` and `AuditEntry::reason`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    #[error("client not registered")]
    ClientNotRegistered,

    #[error("client status: {0}")]
    ClientInactive(ClientStatus),

    #[error("{0}")]
    MiddlewareDenied(String),

    #[error("grant expired")]
    GrantExpired,

    #[error("grant does not allow requested access")]
    GrantInsufficient,

    /// Permission for `key` did not resolve to `Allow`
    #[error("{detail}")]
    DefaultPolicyDenied { key: String, detail: String },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid data schema")]
    InvalidWritePayload,

    #[error("execute requires a capability name")]
    MissingCapability,

    #[error("client lacks execute capability")]
    CapabilityNotPermitted,

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("plugin execution failed: {0}")]
    CapabilityExecutionFailed(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl DenyReason {
    /// Denial for a middleware that gave no reason
    pub fn middleware(reason: Option<String>) -> Self {
        DenyReason::MiddlewareDenied(reason.unwrap_or_else(|| "denied by middleware".to_string()))
    }

    /// Short machine-readable name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            DenyReason::ClientNotRegistered => "client_not_registered",
            DenyReason::ClientInactive(_) => "client_suspended_or_revoked",
            DenyReason::MiddlewareDenied(_) => "middleware_denied",
            DenyReason::GrantExpired => "grant_expired",
            DenyReason::GrantInsufficient => "grant_insufficient",
            DenyReason::DefaultPolicyDenied { .. } => "default_policy_denied",
            DenyReason::RateLimited => "rate_limited",
            DenyReason::InvalidWritePayload => "invalid_write_payload",
            DenyReason::MissingCapability => "missing_capability",
            DenyReason::CapabilityNotPermitted => "capability_not_permitted",
            DenyReason::UnknownCapability(_) => "unknown_capability",
            DenyReason::CapabilityExecutionFailed(_) => "capability_execution_failed",
            DenyReason::InternalError(_) => "internal_error",
        }
    }
}
