//! Node configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via KOBOLD_CONFIG)
//! 3. Environment variables

use kobold_protocol::{Format, DEFAULT_PORT, MAX_MSG_SIZE};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default socket read buffer size (1 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Wire protocol configuration.
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("KOBOLD_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.protocol.apply_env_overrides();
    }

    /// Checks limits that would make the node unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "network.read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.protocol.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "protocol.max_message_size must be greater than zero".to_string(),
            ));
        }
        if self.protocol.max_message_size > MAX_MSG_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "protocol.max_message_size {} exceeds the protocol limit of {} bytes",
                self.protocol.max_message_size, MAX_MSG_SIZE
            )));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds (0 = never).
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Size of each connection's socket read buffer.
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            idle_timeout_secs: 300,
            max_connections: 1000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("KOBOLD_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("KOBOLD_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("KOBOLD_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Ok(size) = std::env::var("KOBOLD_READ_BUFFER") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }
    }

    /// Returns the idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Wire protocol configuration.
///
/// The envelope format is fixed per deployment; both ends must agree on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Envelope format.
    pub format: Format,
    /// Largest payload a length prefix may declare.
    pub max_message_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            format: Format::default(),
            max_message_size: MAX_MSG_SIZE,
        }
    }
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(format) = std::env::var("KOBOLD_FORMAT") {
            match format.parse() {
                Ok(parsed) => self.format = parsed,
                Err(e) => tracing::warn!("Ignoring KOBOLD_FORMAT: {}", e),
            }
        }

        if let Ok(size) = std::env::var("KOBOLD_MAX_MESSAGE_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_message_size = n;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.network.read_buffer_size, 1024 * 1024);
        assert_eq!(config.protocol.format, Format::Cbor);
        assert_eq!(config.protocol.max_message_size, MAX_MSG_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial() {
        let yaml = r#"
network:
  bind_addr: "0.0.0.0:9000"
protocol:
  format: msgpack
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.network.bind_addr.port(), 9000);
        assert_eq!(config.network.max_connections, 1000);
        assert_eq!(config.protocol.format, Format::MsgPack);
        assert_eq!(config.protocol.max_message_size, MAX_MSG_SIZE);
    }

    #[test]
    fn test_yaml_unknown_format() {
        let yaml = "protocol:\n  format: capnp\n";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::ParseError(..))
        ));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.protocol.format = Format::Bincode;
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.bind_addr, config.network.bind_addr);
        assert_eq!(parsed.protocol.format, Format::Bincode);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kobold.yaml");

        let mut config = Config::default();
        config.network.idle_timeout_secs = 0;
        config.protocol.format = Format::Json;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.protocol.format, Format::Json);
        assert_eq!(loaded.network.idle_timeout(), None);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/kobold.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(..))));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.protocol.max_message_size = MAX_MSG_SIZE + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.read_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.protocol.max_message_size = 4096;
        assert!(config.validate().is_ok());
    }
}
