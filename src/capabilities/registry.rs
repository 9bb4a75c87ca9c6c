//! Capability registry
//!
//! Holds the handlers reachable through `execute` requests, plus a closure
//! adapter for handlers that do not need their own type.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::handler::{CapabilityHandler, CapabilityInvocation};
use crate::core::ContextNode;

type BoxFuture = Pin<Box<dyn Future<Output = Result<ContextNode>> + Send>>;

/// A capability backed by an async closure
pub struct FnCapability<F>
where
    F: Fn(CapabilityInvocation) -> BoxFuture + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnCapability<F>
where
    F: Fn(CapabilityInvocation) -> BoxFuture + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> CapabilityHandler for FnCapability<F>
where
    F: Fn(CapabilityInvocation) -> BoxFuture + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, invocation: CapabilityInvocation) -> Result<ContextNode> {
        (self.func)(invocation).await
    }
}

/// Build an `FnCapability` from an async closure
///
/// ```ignore
/// let echo = capability_fn("echo", |inv| async move { Ok(inv.input.unwrap_or_default()) });
/// ```
pub fn capability_fn<F, Fut>(name: impl Into<String>, func: F) -> impl CapabilityHandler
where
    F: Fn(CapabilityInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ContextNode>> + Send + 'static,
{
    FnCapability::new(name, move |invocation| -> BoxFuture { Box::pin(func(invocation)) })
}

/// Registry of capability handlers keyed by name
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any handler with the same name
    pub fn register<H: CapabilityHandler + 'static>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    /// Register a shared handler
    pub fn register_arc(&mut self, handler: Arc<dyn CapabilityHandler>) {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            tracing::warn!("Replacing capability handler: {}", name);
        } else {
            tracing::info!("Registering capability: {}", name);
        }
        self.handlers.insert(name, handler);
    }

    /// Remove a handler by name
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Get a handler by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered capability names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
