//! Bot configuration, loaded from TOML.
//!
//! ```toml
//! baseUrl = "ws://127.0.0.1:3001"
//! accessToken = "secret"
//! botId = 10001
//! routingKeys = [123456, 654321]
//! historyTurns = 20
//!
//! [reconnection]
//! enable = true
//! attempts = 10
//! delay = 5000
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use botmux_connection::{ConnectionSettings, DEFAULT_REQUEST_TIMEOUT};
use botmux_protocol::{GroupId, UserId};
use botmux_session::{DEFAULT_SHUTDOWN_GRACE, SessionSettings};
use botmux_transport::{Endpoint, ReconnectPolicy};
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`BotConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML is malformed or a required field is missing.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The same group is listed twice in `routingKeys`.
    #[error("routing key {0} is listed more than once")]
    DuplicateRoutingKey(GroupId),
}

/// Everything a bot needs to start.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// `ws://` or `wss://` URL of the gateway.
    pub base_url: String,
    pub access_token: String,
    /// The bot's own account; mentions of it address the bot.
    pub bot_id: UserId,
    /// The groups to serve, one session each.
    pub routing_keys: Vec<GroupId>,
    pub reconnection: ReconnectPolicy,
    /// History entries kept per session. Absent disables history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_turns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_ms: Option<u64>,
}

impl BotConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), groups = config.routing_keys.len(), "config loaded");
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that parsing alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        let rest = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"));
        if rest.is_none_or(str::is_empty) {
            return Err(ConfigError::Invalid {
                field: "baseUrl",
                reason: format!("`{url}` is not a ws:// or wss:// URL"),
            });
        }
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "accessToken",
                reason: "must not be empty".into(),
            });
        }
        if self.routing_keys.is_empty() {
            return Err(ConfigError::Invalid {
                field: "routingKeys",
                reason: "at least one group is required".into(),
            });
        }
        let mut seen = HashSet::with_capacity(self.routing_keys.len());
        if let Some(&duplicate) = self.routing_keys.iter().find(|&&key| !seen.insert(key)) {
            return Err(ConfigError::DuplicateRoutingKey(duplicate));
        }
        if self.reconnection.enable && self.reconnection.attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "reconnection.attempts",
                reason: "must be at least 1 when reconnection is enabled".into(),
            });
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "requestTimeoutMs",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.base_url.trim(), self.access_token.clone())
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        let timeout = self
            .request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        ConnectionSettings::new(self.endpoint())
            .with_reconnect(self.reconnection)
            .with_request_timeout(timeout)
    }

    pub fn session_settings(&self) -> SessionSettings {
        let grace = self
            .shutdown_grace_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE);
        SessionSettings::new(self.bot_id, self.routing_keys.clone())
            .with_history_turns(self.history_turns.unwrap_or(0))
            .with_shutdown_grace(grace)
    }
}

// The access token never shows up in logs.
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("bot_id", &self.bot_id)
            .field("routing_keys", &self.routing_keys)
            .field("reconnection", &self.reconnection)
            .field("history_turns", &self.history_turns)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("shutdown_grace_ms", &self.shutdown_grace_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        baseUrl = "ws://127.0.0.1:3001"
        accessToken = "secret"
        botId = 10001
        routingKeys = [123456, 654321]
        historyTurns = 20
        requestTimeoutMs = 2500
        shutdownGraceMs = 1000

        [reconnection]
        enable = true
        attempts = 10
        delay = 5000
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = BotConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.bot_id, UserId(10001));
        assert_eq!(config.routing_keys, vec![GroupId(123456), GroupId(654321)]);
        assert_eq!(config.reconnection.attempts, 10);
        assert_eq!(config.reconnection.delay(), Duration::from_secs(5));
        assert_eq!(config.history_turns, Some(20));

        let connection = config.connection_settings();
        assert_eq!(connection.endpoint.access_token, "secret");
        assert_eq!(connection.request_timeout, Duration::from_millis(2500));

        let sessions = config.session_settings();
        assert_eq!(sessions.history_turns, 20);
        assert_eq!(sessions.shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_optional_fields_default() {
        let text = FULL
            .lines()
            .filter(|line| {
                !["historyTurns", "requestTimeoutMs", "shutdownGraceMs"]
                    .iter()
                    .any(|key| line.trim_start().starts_with(key))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let config = BotConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.history_turns, None);
        assert_eq!(config.session_settings().history_turns, 0);
        assert_eq!(
            config.connection_settings().request_timeout,
            DEFAULT_REQUEST_TIMEOUT
        );
        assert_eq!(
            config.session_settings().shutdown_grace,
            DEFAULT_SHUTDOWN_GRACE
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = BotConfig::from_toml_str(FULL).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
