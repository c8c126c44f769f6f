//! Configuration management for peer sessions

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_SIGNALING_URL: &str = "nats://localhost:4222";
pub const DEFAULT_SUBJECT_PREFIX: &str = "peerlink";

/// ICE server entry handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Signaling backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SignalingConfig {
    pub url: String,
    pub subject_prefix: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SIGNALING_URL.to_string(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Console,
}

#[derive(Debug, Error)]
#[error("unsupported log format: {0}")]
pub struct UnknownLogFormat(String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "pretty" | "text" => Ok(LogFormat::Console),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}

/// Configuration of one local endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub endpoint_id: String,
    pub ice_servers: Vec<IceServerConfig>,
    pub signaling: SignalingConfig,
    pub logging: LoggingConfig,
}

impl SessionConfig {
    /// Configuration with defaults for everything but the endpoint id
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_SERVER)],
            signaling: SignalingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint_id = lookup("PEERLINK_ENDPOINT_ID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| config::ConfigError::NotFound("PEERLINK_ENDPOINT_ID".to_string()))?;

        let urls: Vec<String> = lookup("PEERLINK_ICE_SERVERS")
            .unwrap_or_else(|| DEFAULT_STUN_SERVER.to_string())
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        let ice_servers = if urls.is_empty() {
            Vec::new()
        } else {
            vec![IceServerConfig {
                urls,
                username: lookup("PEERLINK_ICE_USERNAME"),
                credential: lookup("PEERLINK_ICE_CREDENTIAL"),
            }]
        };

        let format = match lookup("LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|e: UnknownLogFormat| config::ConfigError::Message(e.to_string()))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            endpoint_id,
            ice_servers,
            signaling: SignalingConfig {
                url: lookup("PEERLINK_SIGNALING_URL")
                    .unwrap_or_else(|| DEFAULT_SIGNALING_URL.to_string()),
                subject_prefix: lookup("PEERLINK_SIGNALING_PREFIX")
                    .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string()),
            },
            logging: LoggingConfig {
                level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format,
            },
        })
    }

    /// Build configuration from a layered `config` source stack
    pub fn from_sources(source: &config::Config) -> Result<Self, config::ConfigError> {
        let endpoint_id = source.get_string("endpoint_id")?;
        let defaults = Self::new(endpoint_id);

        Ok(Self {
            ice_servers: optional(source.get("ice_servers"))?.unwrap_or(defaults.ice_servers),
            signaling: optional(source.get("signaling"))?.unwrap_or(defaults.signaling),
            logging: optional(source.get("logging"))?.unwrap_or(defaults.logging),
            endpoint_id: defaults.endpoint_id,
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        if self.logging.level.is_empty() {
            "info"
        } else {
            &self.logging.level
        }
    }
}

fn optional<T>(value: Result<T, config::ConfigError>) -> Result<Option<T>, config::ConfigError> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
