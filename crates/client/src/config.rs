//! Client configuration.
//!
//! This module provides TOML-based configuration loading and saving.
//! The default configuration path is `~/.config/fpnn/client.toml`.
//! A [`ClientConfig`] is built once and handed to
//! [`TcpClient::new`](crate::TcpClient::new); nothing reads configuration
//! from global state.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use protocol::{AesKeyBits, Curve, PeerPublicKey, DEFAULT_MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::{ConnectionOptions, EncryptionOptions};
use crate::keepalive::KeepAliveConfig;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than 0")]
    ZeroTimeout { field: &'static str },

    #[error("outbound_queue_capacity must be at least 1, got {0}")]
    InvalidQueueCapacity(usize),

    #[error("max_payload_size must be greater than 0")]
    InvalidMaxPayloadSize,

    #[error("keep_alive.interval_ms must be greater than 0")]
    InvalidKeepAliveInterval,

    #[error("keep_alive.max_retries must be at least 1")]
    InvalidMaxRetries,

    #[error("encryption.bits must be 128 or 256, got {0}")]
    InvalidKeyBits(u32),

    #[error("encryption.public_key is required when encryption is enabled")]
    MissingPublicKey,

    #[error("encryption.public_key is invalid: {0}")]
    InvalidPublicKey(String),

    #[error("encryption.curve is not supported: {0}")]
    UnsupportedCurve(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeouts, queueing and reconnect policy.
    pub connection: ConnectionConfig,

    /// Keep-alive pings.
    pub keep_alive: KeepAliveSettings,

    /// Stream encryption.
    pub encryption: EncryptionConfig,

    /// Logging.
    pub logging: LoggingConfig,
}

/// Connection behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Default time to wait for an answer, in milliseconds.
    pub quest_timeout_ms: u64,

    /// Time allowed for the TCP dial, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Frames buffered for the writer before senders wait.
    pub outbound_queue_capacity: usize,

    /// Largest payload accepted from the peer, in bytes.
    pub max_payload_size: usize,

    /// Re-dial once when a send finds no live connection.
    pub auto_reconnect: bool,
}

/// Keep-alive settings as stored in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeepAliveSettings {
    pub enabled: bool,

    /// Idle time before a ping, in milliseconds.
    pub interval_ms: u64,

    /// Per-ping timeout in milliseconds. Defaults to the quest timeout.
    pub timeout_ms: Option<u64>,

    pub max_retries: u32,
}

/// Encryption settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncryptionConfig {
    pub enabled: bool,

    /// Curve of the server key (secp256r1 or secp256k1).
    pub curve: String,

    /// Base64 server public key, raw X||Y or SEC1 uncompressed.
    pub public_key: Option<String>,

    /// PEM file holding the server public key. Takes precedence over
    /// `curve` and `public_key`.
    pub pem_file: Option<PathBuf>,

    /// AES key width, 128 or 256.
    pub bits: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            quest_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
            outbound_queue_capacity: 64,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            auto_reconnect: true,
        }
    }
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 10_000,
            timeout_ms: None,
            max_retries: 2,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            curve: "secp256r1".to_string(),
            public_key: None,
            pem_file: None,
            bits: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fpnn")
        .join("client.toml")
}

impl ClientConfig {
    /// Enable encryption against the given server key.
    pub fn with_server_key(mut self, curve: Curve, public_key: &[u8], bits: AesKeyBits) -> Self {
        self.encryption = EncryptionConfig {
            enabled: true,
            curve: curve.name().to_string(),
            public_key: Some(BASE64.encode(public_key)),
            pem_file: None,
            bits: bits.bits(),
        };
        self
    }

    /// Enable keep-alive with the given parameters.
    pub fn with_keep_alive(mut self, interval: Duration, timeout: Duration, max_retries: u32) -> Self {
        self.keep_alive = KeepAliveSettings {
            enabled: true,
            interval_ms: interval.as_millis() as u64,
            timeout_ms: Some(timeout.as_millis() as u64),
            max_retries,
        };
        self
    }

    pub fn quest_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.quest_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connect_timeout_ms)
    }

    /// Keep-alive parameters, or `None` when disabled.
    pub fn keep_alive(&self) -> Option<KeepAliveConfig> {
        if !self.keep_alive.enabled {
            return None;
        }
        let timeout_ms = self
            .keep_alive
            .timeout_ms
            .unwrap_or(self.connection.quest_timeout_ms);
        Some(KeepAliveConfig::new(
            Duration::from_millis(self.keep_alive.interval_ms),
            Duration::from_millis(timeout_ms),
            self.keep_alive.max_retries,
        ))
    }

    /// Parsed server public key, or `None` when encryption is disabled.
    pub fn server_public_key(&self) -> Result<Option<PeerPublicKey>, ConfigError> {
        if !self.encryption.enabled {
            return Ok(None);
        }

        if let Some(path) = &self.encryption.pem_file {
            let pem = fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidPublicKey(format!("{}: {}", path.display(), e))
            })?;
            return PeerPublicKey::from_pem(&pem)
                .map(Some)
                .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()));
        }

        let curve: Curve = self
            .encryption
            .curve
            .parse()
            .map_err(|_| ConfigError::UnsupportedCurve(self.encryption.curve.clone()))?;
        if !curve.is_supported() {
            return Err(ConfigError::UnsupportedCurve(self.encryption.curve.clone()));
        }

        let encoded = self
            .encryption
            .public_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingPublicKey)?;
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()))?;

        PeerPublicKey::new(curve, &raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()))
    }

    /// Options for opening a connection.
    pub fn connection_options(&self) -> Result<ConnectionOptions, ConfigError> {
        self.validate_settings()?;

        let encryption = match self.server_public_key()? {
            Some(server_key) => Some(EncryptionOptions {
                server_key,
                bits: AesKeyBits::from_bits(self.encryption.bits)
                    .map_err(|_| ConfigError::InvalidKeyBits(self.encryption.bits))?,
            }),
            None => None,
        };

        Ok(ConnectionOptions {
            quest_timeout: self.quest_timeout(),
            connect_timeout: self.connect_timeout(),
            queue_capacity: self.connection.outbound_queue_capacity,
            max_payload_size: self.connection.max_payload_size,
            keep_alive: self.keep_alive(),
            encryption,
        })
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FPNN_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - FPNN_QUEST_TIMEOUT_MS: Override the default quest timeout
    /// - FPNN_AUTO_RECONNECT: Override auto-reconnect (true/false/1/0)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FPNN_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }

        if let Ok(value) = std::env::var("FPNN_QUEST_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Overriding quest_timeout_ms from environment: {}", ms);
                    self.connection.quest_timeout_ms = ms;
                }
                Err(_) if value.is_empty() => {}
                Err(_) => tracing::warn!("Ignoring invalid FPNN_QUEST_TIMEOUT_MS: {:?}", value),
            }
        }

        if let Ok(value) = std::env::var("FPNN_AUTO_RECONNECT") {
            match value.to_ascii_lowercase().as_str() {
                "" => {}
                "true" | "1" | "yes" => self.connection.auto_reconnect = true,
                "false" | "0" | "no" => self.connection.auto_reconnect = false,
                _ => tracing::warn!("Ignoring invalid FPNN_AUTO_RECONNECT: {:?}", value),
            }
        }
    }

    /// Validate the configuration values, including the server key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        self.server_public_key()?;
        Ok(())
    }

    /// Every check except loading the server key.
    fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.connection.quest_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "quest_timeout_ms",
            });
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "connect_timeout_ms",
            });
        }
        if self.connection.outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(0));
        }
        if self.connection.max_payload_size == 0 {
            return Err(ConfigError::InvalidMaxPayloadSize);
        }

        if self.keep_alive.enabled {
            if self.keep_alive.interval_ms == 0 {
                return Err(ConfigError::InvalidKeepAliveInterval);
            }
            if self.keep_alive.timeout_ms == Some(0) {
                return Err(ConfigError::ZeroTimeout {
                    field: "keep_alive.timeout_ms",
                });
            }
            if self.keep_alive.max_retries == 0 {
                return Err(ConfigError::InvalidMaxRetries);
            }
        }

        if self.encryption.enabled && AesKeyBits::from_bits(self.encryption.bits).is_err() {
            return Err(ConfigError::InvalidKeyBits(self.encryption.bits));
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::EcdhKeyPair;
    use serial_test::serial;
    use tempfile::TempDir;

    fn server_key_b64() -> String {
        let pair = EcdhKeyPair::generate(Curve::Secp256r1).unwrap();
        BASE64.encode(pair.public_key().raw_bytes())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.connection.quest_timeout_ms, 5_000);
        assert_eq!(config.connection.connect_timeout_ms, 5_000);
        assert_eq!(config.connection.outbound_queue_capacity, 64);
        assert_eq!(config.connection.max_payload_size, 200 * 1024 * 1024);
        assert!(config.connection.auto_reconnect);
        assert!(!config.keep_alive.enabled);
        assert!(!config.encryption.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ClientConfig::from_toml(
            r#"
            [connection]
            quest_timeout_ms = 6000

            [keep_alive]
            enabled = true
            interval_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.quest_timeout(), Duration::from_secs(6));
        assert_eq!(config.connection.connect_timeout_ms, 5_000);

        let keep_alive = config.keep_alive().unwrap();
        assert_eq!(keep_alive.interval, Duration::from_secs(2));
        // Ping timeout falls back to the quest timeout.
        assert_eq!(keep_alive.timeout, Duration::from_secs(6));
        assert_eq!(keep_alive.max_retries, 2);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let err = ClientConfig::from_toml("invalid [ toml").unwrap_err();
        assert!(err.to_string().contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let result = ClientConfig::from_toml(
            r#"
            [connection]
            quest_timeout_ms = "soon"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut original = ClientConfig::default()
            .with_keep_alive(Duration::from_secs(3), Duration::from_secs(1), 4);
        original.connection.auto_reconnect = false;
        original.logging.level = "debug".to_string();

        let toml = original.to_toml().unwrap();
        let loaded = ClientConfig::from_toml(&toml).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = ClientConfig::load("/nonexistent/path/client.toml").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("client.toml");

        let mut original = ClientConfig::default();
        original.connection.quest_timeout_ms = 1234;
        original.save(&config_path).unwrap();

        let loaded = ClientConfig::load(&config_path).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("client.toml");
        fs::write(&config_path, "[connection\n").unwrap();

        let err = ClientConfig::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("fpnn"));
        assert!(path.to_string_lossy().ends_with("client.toml"));
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let mut config = ClientConfig::default();
        config.connection.quest_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout {
                field: "quest_timeout_ms"
            })
        );

        let mut config = ClientConfig::default();
        config.connection.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_queue_and_payload() {
        let mut config = ClientConfig::default();
        config.connection.outbound_queue_capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidQueueCapacity(0)));

        let mut config = ClientConfig::default();
        config.connection.max_payload_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxPayloadSize));
    }

    #[test]
    fn test_validate_keep_alive() {
        let mut config = ClientConfig::default();
        config.keep_alive.enabled = true;
        config.keep_alive.max_retries = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxRetries));

        config.keep_alive.max_retries = 1;
        config.keep_alive.interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidKeepAliveInterval));

        // Disabled keep-alive is not validated.
        config.keep_alive.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_encryption() {
        let mut config = ClientConfig::default();
        config.encryption.enabled = true;
        assert_eq!(config.validate(), Err(ConfigError::MissingPublicKey));

        config.encryption.public_key = Some("not base64!".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPublicKey(_))
        ));

        config.encryption.public_key = Some(server_key_b64());
        assert!(config.validate().is_ok());

        config.encryption.bits = 192;
        assert_eq!(config.validate(), Err(ConfigError::InvalidKeyBits(192)));

        config.encryption.bits = 128;
        config.encryption.curve = "secp224r1".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedCurve("secp224r1".to_string()))
        );
    }

    #[test]
    fn test_with_server_key() {
        let pair = EcdhKeyPair::generate(Curve::Secp256k1).unwrap();
        let config = ClientConfig::default().with_server_key(
            Curve::Secp256k1,
            pair.public_key().raw_bytes(),
            AesKeyBits::Aes128,
        );

        let options = config.connection_options().unwrap();
        let encryption = options.encryption.unwrap();
        assert_eq!(encryption.server_key, pair.public_key());
        assert_eq!(encryption.bits, AesKeyBits::Aes128);
    }

    #[test]
    fn test_pem_file_key() {
        let temp_dir = TempDir::new().unwrap();
        let pem_path = temp_dir.path().join("server-public.pem");
        let key = EcdhKeyPair::generate(Curve::Secp256k1).unwrap().public_key();
        fs::write(&pem_path, key.to_pem().unwrap()).unwrap();

        let mut config = ClientConfig::default();
        config.encryption.enabled = true;
        config.encryption.pem_file = Some(pem_path);
        assert_eq!(config.server_public_key().unwrap(), Some(key));

        config.encryption.pem_file = Some(temp_dir.path().join("missing.pem"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_connection_options_from_pem_file() {
        let temp_dir = TempDir::new().unwrap();
        let pem_path = temp_dir.path().join("server-public.pem");
        let key = EcdhKeyPair::generate(Curve::Secp256r1).unwrap().public_key();
        fs::write(&pem_path, key.to_pem().unwrap()).unwrap();

        let mut config = ClientConfig::default();
        config.encryption.enabled = true;
        config.encryption.bits = 128;
        config.encryption.pem_file = Some(pem_path.clone());

        let encryption = config.connection_options().unwrap().encryption.unwrap();
        assert_eq!(encryption.server_key, key);
        assert_eq!(encryption.bits, AesKeyBits::Aes128);

        fs::remove_file(&pem_path).unwrap();
        assert!(matches!(
            config.connection_options(),
            Err(ConfigError::InvalidPublicKey(_))
        ));

        config.encryption.bits = 64;
        assert_eq!(
            config.connection_options().unwrap_err(),
            ConfigError::InvalidKeyBits(64)
        );
    }

    #[test]
    fn test_connection_options() {
        let options = ClientConfig::default().connection_options().unwrap();
        assert_eq!(options.quest_timeout, Duration::from_secs(5));
        assert_eq!(options.queue_capacity, 64);
        assert!(options.keep_alive.is_none());
        assert!(options.encryption.is_none());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ClientConfig::default();
        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config = ClientConfig::from_toml(
            r#"
            [connection]
            quest_timeout_ms = 100
            legacy_option = true
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.quest_timeout_ms, 100);
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("FPNN_LOG_LEVEL", "trace");
        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "trace");
        std::env::remove_var("FPNN_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_quest_timeout() {
        std::env::set_var("FPNN_QUEST_TIMEOUT_MS", "2500");
        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.quest_timeout(), Duration::from_millis(2500));

        std::env::set_var("FPNN_QUEST_TIMEOUT_MS", "soon");
        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.connection.quest_timeout_ms, 5_000);

        std::env::remove_var("FPNN_QUEST_TIMEOUT_MS");
    }

    #[test]
    #[serial]
    fn test_env_override_auto_reconnect() {
        std::env::set_var("FPNN_AUTO_RECONNECT", "false");
        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert!(!config.connection.auto_reconnect);
        std::env::remove_var("FPNN_AUTO_RECONNECT");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("FPNN_LOG_LEVEL");
        std::env::remove_var("FPNN_QUEST_TIMEOUT_MS");
        std::env::remove_var("FPNN_AUTO_RECONNECT");

        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        assert_eq!(config, ClientConfig::default());
    }
}
