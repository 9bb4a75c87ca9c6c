//! Middleware Chain
//!
//! Contains:
//! - `Middleware` trait - for implementing middleware
//! - `MiddlewareMatcher` - restricts a middleware to matching client ids
//! - `MiddlewareChain` - stores middleware and runs it in order

use std::sync::Arc;

use regex::Regex;

use super::types::{MiddlewareContext, MiddlewareResult};
use crate::clients::Client;
use crate::context::ContextStore;
use crate::core::DenyReason;
use crate::gatekeeper::{AccessRequest, Grant};
use crate::permissions::PermissionRegistry;

/// Trait for middleware implementations
///
/// Middleware is synchronous: it runs under the gatekeeper lock and must
/// not block.
pub trait Middleware: Send + Sync {
    fn call(&self, ctx: &MiddlewareContext<'_>) -> MiddlewareResult;
}

/// Implement Middleware for closures
impl<F> Middleware for F
where
    F: for<'a> Fn(&MiddlewareContext<'a>) -> MiddlewareResult + Send + Sync,
{
    fn call(&self, ctx: &MiddlewareContext<'_>) -> MiddlewareResult {
        (self)(ctx)
    }
}

/// Type alias for stored middleware
pub type ArcMiddleware = Arc<dyn Middleware>;

/// A middleware plus the client ids it applies to
pub struct MiddlewareMatcher {
    name: String,

    /// Regex over client ids (None = every client)
    pattern: Option<Regex>,

    middleware: ArcMiddleware,
}

impl MiddlewareMatcher {
    /// Create a matcher that applies to every client
    pub fn new<M: Middleware + 'static>(name: impl Into<String>, middleware: M) -> Self {
        Self {
            name: name.into(),
            pattern: None,
            middleware: Arc::new(middleware),
        }
    }

    /// Create a matcher for client ids matching `pattern`
    ///
    /// Pattern examples:
    /// - `"^shopping-agent$"` - one client
    /// - `"-agent$"` - every agent following the naming convention
    pub fn with_pattern<M: Middleware + 'static>(
        name: impl Into<String>,
        pattern: &str,
        middleware: M,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Some(Regex::new(pattern)?),
            middleware: Arc::new(middleware),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this matcher applies to a client id
    pub fn matches(&self, client_id: &str) -> bool {
        match &self.pattern {
            Some(regex) => regex.is_match(client_id),
            None => true,
        }
    }

    pub fn run(&self, ctx: &MiddlewareContext<'_>) -> MiddlewareResult {
        self.middleware.call(ctx)
    }
}

impl std::fmt::Debug for MiddlewareMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareMatcher")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_ref().map(|r| r.as_str()))
            .finish()
    }
}

/// Ordered list of middleware
///
/// # Example
///
/// ```ignore
/// let mut chain = MiddlewareChain::new();
///
/// // No writes at night
/// chain.add("quiet-hours", |ctx: &MiddlewareContext| {
///     if ctx.request.action == AccessAction::Write && is_night() {
///         MiddlewareResult::deny("writes are paused overnight")
///     } else {
///         MiddlewareResult::allow()
///     }
/// });
/// ```
#[derive(Default)]
pub struct MiddlewareChain {
    matchers: Vec<MiddlewareMatcher>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware that applies to every client
    pub fn add<M: Middleware + 'static>(&mut self, name: impl Into<String>, middleware: M) -> &mut Self {
        self.matchers.push(MiddlewareMatcher::new(name, middleware));
        self
    }

    /// Add middleware for client ids matching `pattern`
    pub fn add_with_pattern<M: Middleware + 'static>(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        middleware: M,
    ) -> Result<&mut Self, regex::Error> {
        self.matchers
            .push(MiddlewareMatcher::with_pattern(name, pattern, middleware)?);
        Ok(self)
    }

    /// Add a pre-built matcher
    pub fn add_matcher(&mut self, matcher: MiddlewareMatcher) -> &mut Self {
        self.matchers.push(matcher);
        self
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Run every applicable middleware in registration order
    ///
    /// The first denial stops the chain. A `modified_request` replaces the
    /// request seen by later middleware and returned to the caller.
    pub fn run(
        &self,
        mut request: AccessRequest,
        client: &Client,
        context: &ContextStore,
        permissions: &PermissionRegistry,
        grant: Option<&Grant>,
    ) -> Result<AccessRequest, DenyReason> {
        for matcher in &self.matchers {
            if !matcher.matches(&request.client_id) {
                continue;
            }

            let result = matcher.run(&MiddlewareContext {
                request: &request,
                client,
                context,
                permissions,
                grant,
            });

            if !result.allowed {
                tracing::debug!(middleware = matcher.name(), "[MiddlewareChain] Request denied");
                return Err(DenyReason::middleware(result.reason));
            }

            if let Some(modified) = result.modified_request {
                tracing::debug!(middleware = matcher.name(), "[MiddlewareChain] Request rewritten");
                request = modified;
            }
        }

        Ok(request)
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.matchers.iter().map(MiddlewareMatcher::name))
            .finish()
    }
}
