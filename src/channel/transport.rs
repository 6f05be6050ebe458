//! Transport seam between the protocol and the delivery mechanism

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Receives raw frames delivered by a transport
pub type FrameHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Fire-and-forget frame delivery
///
/// Frames posted by one endpoint arrive at its peers in posting order.
/// Whether the sender also receives its own frames depends on the transport,
/// so the protocol filters by [`Role`] itself.
pub trait Transport: Send + Sync {
    /// Queue `frame` for delivery; fails only when the transport is unusable
    fn post_message(&self, frame: String) -> Result<()>;

    /// Install the frame receiver, replacing any previous one
    fn on_message(&self, handler: FrameHandler);

    /// Stop delivery in both directions; idempotent
    fn close(&self);
}

/// Which side of the session an endpoint plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Media,
}

impl Role {
    pub fn peer(self) -> Role {
        match self {
            Role::Controller => Role::Media,
            Role::Media => Role::Controller,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Controller => write!(f, "controller"),
            Role::Media => write!(f, "media"),
        }
    }
}

/// Frame layout on every transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub sender: Role,
    pub message: M,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_layout() {
        let frame = Envelope {
            sender: Role::Media,
            message: json!({"command": "exit"}),
        };

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"sender": "media", "message": {"command": "exit"}})
        );
        assert_eq!(Role::Media.peer(), Role::Controller);
    }
}
