//! Change notifications
//!
//! The gatekeeper publishes on a broadcast channel after state changes and
//! denials. Subscribers (a UI, a logger) are outside the core; sending with
//! nobody listening is not an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::request::AccessAction;
use crate::permissions::DefaultPolicy;

/// Buffer size for the event broadcast channel
pub const EVENT_CHANNEL_SIZE: usize = 256;

/// Something subscribers may want to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatekeeperEvent {
    /// A write (or admin setter) changed the context
    ContextUpdated {
        client_id: String,
        sections: Vec<String>,
    },

    /// Stored permissions changed
    PermissionsChanged { keys: Vec<String> },

    /// The default policy changed
    PolicyChanged { policy: DefaultPolicy },

    /// A request was denied
    AccessDenied {
        client_id: String,
        action: AccessAction,
        reason: String,
    },
}

/// Sender half of the event channel
pub type EventSender = broadcast::Sender<GatekeeperEvent>;

/// Receiver half of the event channel
pub type EventReceiver = broadcast::Receiver<GatekeeperEvent>;

/// Create the event channel
///
/// Receivers are created by calling `sender.subscribe()`.
pub fn create_event_channel() -> EventSender {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
    tx
}
