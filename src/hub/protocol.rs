//! Realtime channel frames
//!
//! ```json
//! // client -> hub
//! {"type": "lock", "username": "user1"}
//! {"type": "unlock", "username": "user1"}
//!
//! // hub -> client
//! {"type": "locks", "locks": {"user1": true}}
//! {"type": "names", "names": {"user1": "Alice"}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message sent from hub to viewers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full `username -> displayName` mapping
    Names { names: BTreeMap<String, String> },
    /// Full lock table snapshot
    Locks { locks: BTreeMap<String, bool> },
}

/// Message received from a viewer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Lock { username: String },
    Unlock { username: String },
}

impl ClientMessage {
    /// Decode a frame; unknown types and malformed payloads yield `None`
    pub fn decode(frame: &str) -> Option<Self> {
        serde_json::from_str(frame).ok()
    }
}
