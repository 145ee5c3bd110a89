//! Client configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every field
//! is optional; missing fields fall back to the well-known server defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default server host
pub const DEFAULT_HOST: &str = "aspidera-isitstoneserver.azurewebsites.net";

/// Default server port
pub const DEFAULT_PORT: u16 = 80;

/// Default bound on waiting for a single reply
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Wire carrying the `<tag>@<payload>` frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One text message per frame over a WebSocket (the public server)
    #[default]
    WebSocket,
    /// Newline-delimited lines over a raw TCP stream
    Tcp,
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Zero disables the timeout
    pub request_timeout_ms: u64,
    /// Keep acknowledged messages around for diagnostics
    pub keep_history: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            transport: TransportKind::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            keep_history: cfg!(debug_assertions),
        }
    }
}

impl ClientConfig {
    /// Settings for a specific server, other fields defaulted
    pub fn with_server(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` string suitable for resolving
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket endpoint; the server listens on the root path
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.request_timeout_ms))
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Serialize failed: {}", e)))
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Platform config file location, if a home directory can be found
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lobby").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(
            config.request_timeout(),
            Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
        );
        assert_eq!(config.address(), format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT));
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(
            config.websocket_url(),
            format!("ws://{}:{}/", DEFAULT_HOST, DEFAULT_PORT)
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = ClientConfig::from_toml_str("host = \"127.0.0.1\"\nport = 9000\n").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = ClientConfig::from_toml_str("request_timeout_ms = 0").unwrap();
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_transport_kind_from_toml() {
        let config = ClientConfig::from_toml_str("transport = \"tcp\"").unwrap();
        assert_eq!(config.transport, TransportKind::Tcp);

        let config = ClientConfig::from_toml_str("transport = \"websocket\"").unwrap();
        assert_eq!(config.transport, TransportKind::WebSocket);

        assert!(ClientConfig::from_toml_str("transport = \"udp\"").is_err());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = ClientConfig::from_toml_str("port = \"eighty\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"example.org\"").unwrap();
        writeln!(file, "keep_history = true").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.host, "example.org");
        assert!(config.keep_history);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_toml_string_roundtrip() {
        let config = ClientConfig::with_server("localhost", 7000);
        let parsed = ClientConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
