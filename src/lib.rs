pub mod core;
pub mod context;
pub mod permissions;

// Bookkeeping around requests
pub mod audit;
pub mod clients;

// Extension points
pub mod middleware;
pub mod capabilities;

// The request pipeline and admin surface
pub mod gatekeeper;

pub mod logging;

pub use crate::core::{ContextNode, DenyReason, GatekeeperConfig, GatekeeperError, GatekeeperResult};
pub use crate::gatekeeper::{AccessAction, AccessGatekeeper, AccessRequest, AccessResponse};
