//! Registered callers and their usage counters

mod registry;

pub use registry::{
    Client, ClientCapability, ClientRegistry, ClientStatus, ClientType, SYSTEM_CLIENT_ID,
};
