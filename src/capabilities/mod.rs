//! Named capabilities invoked through `execute` requests

mod handler;
mod registry;

pub use handler::{CapabilityHandler, CapabilityInvocation};
pub use registry::{capability_fn, CapabilityRegistry, FnCapability};
