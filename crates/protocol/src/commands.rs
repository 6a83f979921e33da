//! Outbound payloads: the handshake and RPC commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::Activity;
use crate::constants::{CMD_SET_ACTIVITY, PROTOCOL_VERSION};

/// First payload sent on a fresh connection (opcode 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub v: u32,
    pub client_id: String,
}

impl Handshake {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            client_id: client_id.into(),
        }
    }
}

/// An RPC command frame (opcode 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command<A> {
    pub cmd: String,
    pub args: A,
    pub nonce: String,
}

/// Arguments of `SET_ACTIVITY`. A missing activity clears the presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetActivityArgs {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
}

impl Command<SetActivityArgs> {
    /// Builds a `SET_ACTIVITY` command with a fresh nonce.
    pub fn set_activity(pid: u32, activity: Option<Activity>) -> Self {
        Self {
            cmd: CMD_SET_ACTIVITY.into(),
            args: SetActivityArgs { pid, activity },
            nonce: new_nonce(),
        }
    }
}

/// Generates a correlation token for an outbound command.
pub fn new_nonce() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns `true` if an inbound payload answers a `SET_ACTIVITY` command.
pub fn is_set_activity(payload: &Value) -> bool {
    payload.get("cmd").and_then(Value::as_str) == Some(CMD_SET_ACTIVITY)
}
