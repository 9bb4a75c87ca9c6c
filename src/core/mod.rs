//! Core types shared across the gatekeeper
//!
//! - `ContextNode` - the tagged-variant context tree
//! - `GatekeeperError` / `DenyReason` - error types
//! - `GatekeeperConfig` - tunable parameters
//! - `Clock` - time source for rate limiting and grant expiry

pub mod clock;
pub mod config;
pub mod error;
pub mod node;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{GatekeeperConfig, RateLimitConfig};
pub use error::{DenyReason, GatekeeperError, GatekeeperResult};
pub use node::{is_valid_path, ContextNode, NodeMap};
