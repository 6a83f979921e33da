//! Well-known local endpoints of the peer process.
//!
//! The peer listens on one of several numbered slots so that more than one
//! instance can run on the same host:
//! - Unix: `<runtime dir>/discord-ipc-<slot>` (domain socket)
//! - Windows: `\\.\pipe\discord-ipc-<slot>` (named pipe)
//! - WebSocket: `ws://127.0.0.1:<6463 + slot>/?v=1`

use std::path::PathBuf;

use crate::constants::{IPC_BASENAME, PROTOCOL_VERSION, WS_BASE_PORT};

/// Returns the local socket / pipe path for `slot`.
pub fn ipc_path(slot: u8) -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(format!(r"\\.\pipe\{IPC_BASENAME}-{slot}"))
    }

    #[cfg(not(windows))]
    {
        runtime_dir().join(format!("{IPC_BASENAME}-{slot}"))
    }
}

/// Returns the local WebSocket URL for `slot`.
pub fn ws_url(slot: u8) -> String {
    let port = WS_BASE_PORT.saturating_add(u16::from(slot));
    format!("ws://127.0.0.1:{port}/?v={PROTOCOL_VERSION}")
}

/// Directory the peer creates its socket in.
#[cfg(not(windows))]
fn runtime_dir() -> PathBuf {
    ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_path_ends_with_slot() {
        let path = ipc_path(3);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, "discord-ipc-3");
    }

    #[test]
    fn slots_are_distinct() {
        assert_ne!(ipc_path(0), ipc_path(1));
        assert_ne!(ws_url(0), ws_url(1));
    }

    #[test]
    fn ws_url_uses_slot_port() {
        assert_eq!(ws_url(0), "ws://127.0.0.1:6463/?v=1");
        assert_eq!(ws_url(9), "ws://127.0.0.1:6472/?v=1");
    }
}
