//! Middleware Module
//!
//! Inspect and rewrite requests after client validation and before
//! grant/permission evaluation.
//!
//! Middleware lets you:
//! - Deny requests on rules the permission model cannot express
//! - Inject derived sections into a request
//! - Restrict a rule to some clients by id pattern
//!
//! # Example
//!
//! ```ignore
//! use context_gatekeeper::middleware::{MiddlewareContext, MiddlewareResult};
//!
//! gatekeeper.add_middleware("no-identity-writes", |ctx: &MiddlewareContext| {
//!     let touches_identity = ctx.request.sections.iter().any(|s| s.starts_with("identity"));
//!     if ctx.request.action == AccessAction::Write && touches_identity {
//!         MiddlewareResult::deny("identity is read-only")
//!     } else {
//!         MiddlewareResult::allow()
//!     }
//! }).await;
//! ```
//!
//! # MiddlewareResult
//!
//! | Method | Effect |
//! |--------|--------|
//! | `MiddlewareResult::allow()` | Continue unchanged |
//! | `MiddlewareResult::deny("reason")` | Stop; the reason becomes the response error |
//! | `MiddlewareResult::modify(request)` | Continue with the rewritten request |

mod registry;
mod types;

pub use registry::{ArcMiddleware, Middleware, MiddlewareChain, MiddlewareMatcher};
pub use types::{MiddlewareContext, MiddlewareResult};
