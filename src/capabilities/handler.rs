//! Capability handler trait
//!
//! An `execute` request names a capability; the gatekeeper looks up the
//! handler registered under that name and invokes it outside its lock.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::core::ContextNode;

/// Everything a handler gets to see
///
/// This is a snapshot taken under the gatekeeper lock; the handler runs
/// after the lock is released, so it cannot observe later writes.
#[derive(Debug, Clone)]
pub struct CapabilityInvocation {
    /// Id of the request, as recorded in the audit log
    pub request_id: String,

    pub client_id: String,

    pub capability: String,

    /// Context projected onto the request's sections
    pub context: ContextNode,

    /// The request's `data` payload, if any
    pub input: Option<ContextNode>,

    /// The request's opaque metadata
    pub metadata: HashMap<String, Value>,
}

/// Trait for named capabilities callable through `execute`
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Name the capability is registered under
    fn name(&self) -> &str;

    /// Short description for admin listings
    fn description(&self) -> &str {
        ""
    }

    /// Run the capability
    ///
    /// May perform I/O. Errors become a `plugin execution failed` denial.
    async fn execute(&self, invocation: CapabilityInvocation) -> Result<ContextNode>;
}
