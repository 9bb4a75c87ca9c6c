//! Access gatekeeper
//!
//! `AccessGatekeeper` is the only way in: clients send an `AccessRequest`
//! and get back an `AccessResponse`, and administrators use its async
//! methods to manage permissions, clients, grants and extension points.
//!
//! # Example
//!
//! ```ignore
//! let gatekeeper = AccessGatekeeper::new(GatekeeperConfig::from_env()?);
//! gatekeeper.register_client(Client::new("shopping-agent", "Shopper", ClientType::Agent)).await;
//!
//! let response = gatekeeper
//!     .access_context(AccessRequest::read("shopping-agent", ["preferences"]))
//!     .await;
//! if !response.success {
//!     println!("denied: {}", response.error.unwrap_or_default());
//! }
//! ```

mod events;
#[allow(clippy::module_inception)]
mod gatekeeper;
mod grants;
mod rate_limit;
mod request;

pub use events::{create_event_channel, EventReceiver, EventSender, GatekeeperEvent, EVENT_CHANNEL_SIZE};
pub use gatekeeper::{AccessGatekeeper, ReadTransform};
pub use grants::{Grant, GrantStore};
pub use rate_limit::RateLimiter;
pub use request::{AccessAction, AccessRequest, AccessResponse, ResponseMetadata};
