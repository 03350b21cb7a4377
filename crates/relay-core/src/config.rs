//! Configuration system for the relay.
//!
//! Resolution order: command line → environment variables → config file → defaults.
//! The command line layer lives in the binaries; everything else is here.
//!
//! Config file location:
//!   1. $RELAY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/relay/config.toml
//!   3. ~/.config/relay/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerSettings,
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to listen on.
    pub bind_addr: String,
    /// TCP port. 0 = OS-assigned.
    pub port: u16,
    /// Reported in name responses.
    pub name: String,
    /// Listen backlog.
    pub backlog: u32,
    /// How long shutdown waits for session tasks before aborting them.
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_host: String,
    pub server_port: u16,
    /// Where inbound files are reassembled.
    pub downloads_dir: PathBuf,
    /// Delay between outbound file chunks.
    pub chunk_pacing_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_PORT: u16 = 4468;

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            name: "relayd".to_string(),
            backlog: 128,
            drain_timeout_secs: 5,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: DEFAULT_PORT,
            downloads_dir: data_dir().join("downloads"),
            chunk_pacing_ms: 10,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("relay")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("relay")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit file, then apply env vars.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse `path`, or return defaults if it does not exist.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RelayConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply RELAY_* overrides. `lookup` is `std::env::var` outside tests.
    /// Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELAY_SERVER__BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(p) = lookup("RELAY_SERVER__PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = lookup("RELAY_SERVER__NAME") {
            self.server.name = v;
        }
        if let Some(b) = lookup("RELAY_SERVER__BACKLOG").and_then(|v| v.parse().ok()) {
            self.server.backlog = b;
        }
        if let Some(v) = lookup("RELAY_CLIENT__SERVER_HOST") {
            self.client.server_host = v;
        }
        if let Some(p) = lookup("RELAY_CLIENT__SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.client.server_port = p;
        }
        if let Some(v) = lookup("RELAY_CLIENT__DOWNLOADS_DIR") {
            self.client.downloads_dir = PathBuf::from(v);
        }
        if let Some(ms) = lookup("RELAY_CLIENT__CHUNK_PACING_MS").and_then(|v| v.parse().ok()) {
            self.client.chunk_pacing_ms = ms;
        }
    }
}
