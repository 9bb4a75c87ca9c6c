//! Middleware Types
//!
//! - `MiddlewareContext` - read-only view handed to each middleware
//! - `MiddlewareResult` - allow/deny plus an optional rewritten request

use crate::clients::Client;
use crate::context::ContextStore;
use crate::gatekeeper::{AccessRequest, Grant};
use crate::permissions::PermissionRegistry;

/// What a middleware sees
///
/// Everything is borrowed from the gatekeeper's locked state, so a
/// middleware observes a consistent snapshot but cannot mutate it.
pub struct MiddlewareContext<'a> {
    /// The request as rewritten by earlier middleware
    pub request: &'a AccessRequest,

    /// The validated client
    pub client: &'a Client,

    /// Current context tree
    pub context: &'a ContextStore,

    /// Stored permissions and the default policy
    pub permissions: &'a PermissionRegistry,

    /// The client's grant, if one exists
    pub grant: Option<&'a Grant>,
}

impl<'a> MiddlewareContext<'a> {
    pub fn client_id(&self) -> &str {
        &self.client.id
    }
}

/// Result returned from a middleware
///
/// For a pass-through, return `MiddlewareResult::allow()`.
#[derive(Debug, Clone)]
pub struct MiddlewareResult {
    /// Whether the request may continue
    pub allowed: bool,

    /// Reason shown to the caller when denied
    pub reason: Option<String>,

    /// Replacement request for the rest of the pipeline
    pub modified_request: Option<AccessRequest>,
}

impl MiddlewareResult {
    /// Let the request continue unchanged
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            modified_request: None,
        }
    }

    /// Stop the request with a reason
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            modified_request: None,
        }
    }

    /// Continue with a rewritten request
    pub fn modify(request: AccessRequest) -> Self {
        Self {
            allowed: true,
            reason: None,
            modified_request: Some(request),
        }
    }
}

impl Default for MiddlewareResult {
    fn default() -> Self {
        Self::allow()
    }
}
