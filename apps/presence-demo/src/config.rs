//! Demo configuration.
//!
//! Read from TOML, never written back:
//! - the path given as the first command-line argument, or
//! - `$XDG_CONFIG_HOME/presence-rpc/demo.toml` (`~/.config/...` when unset).
//!
//! Durations are given in milliseconds.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use presence_client::{ConnectionOptions, ReconnectConfig, TransportKind};
use presence_protocol::Activity;
use presence_protocol::constants::{
    DEFAULT_ACTIVITY_INTERVAL, DEFAULT_ANIMATION_INTERVAL, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Application id registered with the presence peer.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Socket path or WebSocket URL; the well-known endpoint for
    /// `pipe_slot` when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub pipe_slot: u8,

    /// Minimum spacing between activity updates.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub progress: ProgressSection,

    #[serde(default)]
    pub animation: AnimationSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub enabled: bool,
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub connect_timeout_ms: u64,
}

/// The progress bar shown once the session is ready.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressSection {
    pub label: String,
    pub duration_secs: f64,
    pub state: Option<String>,
    pub large_image_key: Option<String>,
    pub large_image_text: Option<String>,
}

/// Details lines cycled instead of the progress bar when non-empty.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnimationSection {
    pub frames: Vec<String>,
    pub interval_ms: u64,
}

fn default_client_id() -> String {
    "YOUR_CLIENT_ID_HERE".into()
}

fn default_rate_limit_ms() -> u64 {
    DEFAULT_ACTIVITY_INTERVAL.as_millis() as u64
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            label: "Progressing...".into(),
            duration_secs: 30.0,
            state: Some("Step 1/3".into()),
            large_image_key: Some("progress".into()),
            large_image_text: Some("Progress Bar".into()),
        }
    }
}

impl Default for AnimationSection {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            interval_ms: DEFAULT_ANIMATION_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            transport: TransportKind::default(),
            endpoint: None,
            pipe_slot: 0,
            rate_limit_ms: default_rate_limit_ms(),
            reconnect: ReconnectSection::default(),
            progress: ProgressSection::default(),
            animation: AnimationSection::default(),
        }
    }
}

impl Config {
    /// Reads `path`, or returns the defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        let options = ConnectionOptions::new(self.client_id.clone())
            .with_transport(self.transport)
            .with_pipe_slot(self.pipe_slot);
        match &self.endpoint {
            Some(endpoint) => options.with_endpoint(endpoint.clone()),
            None => options,
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            enabled: self.reconnect.enabled,
            max_attempts: self.reconnect.max_attempts,
            delay: Duration::from_millis(self.reconnect.delay_ms),
            connect_timeout: Duration::from_millis(self.reconnect.connect_timeout_ms),
        }
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

impl ProgressSection {
    /// Fields shown alongside the progress label.
    pub fn extra(&self) -> Activity {
        Activity {
            state: self.state.clone(),
            large_image_key: self.large_image_key.clone(),
            large_image_text: self.large_image_text.clone(),
            ..Activity::default()
        }
    }
}

impl AnimationSection {
    pub fn activities(&self) -> Vec<Activity> {
        self.frames.iter().map(Activity::with_details).collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Config file location: the explicit argument if given, else the per-user
/// config directory.
pub fn resolve_path(arg: Option<OsString>) -> PathBuf {
    if let Some(arg) = arg {
        return PathBuf::from(arg);
    }
    config_dir().join("presence-rpc").join("demo.toml")
}

fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata);
        }
    }

    let home = std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into());
    PathBuf::from(home).join(".config")
}
