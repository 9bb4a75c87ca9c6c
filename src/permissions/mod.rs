//! Permission system for context access
//!
//! Every context key carries a `(read, write)` pair of tri-state values:
//! - **Allow**: access without asking
//! - **Ask**: needs the user's approval
//! - **Never**: always refused
//!
//! Keys without a stored entry fall back to the active `DefaultPolicy`.
//!
//! ## Example
//!
//! ```rust
//! use context_gatekeeper::permissions::{
//!     DefaultPolicy, Permission, PermissionRegistry, PermissionValue,
//! };
//!
//! let mut registry = PermissionRegistry::new(DefaultPolicy::AllowList);
//! assert_eq!(registry.get_permission("budget"), Permission::deny_all());
//!
//! registry.set_permission(
//!     "budget",
//!     Permission::new(PermissionValue::Allow, PermissionValue::Never),
//! );
//! assert!(registry.get_permission("budget").read.is_allow());
//! ```

mod authority;
mod registry;

pub use authority::{AgentContext, AuthorityGenerator, KeywordAuthority};
pub use registry::{DefaultPolicy, Permission, PermissionMap, PermissionRegistry, PermissionValue};
