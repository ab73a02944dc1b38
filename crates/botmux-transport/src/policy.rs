//! Where to connect and what to do when the link drops.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The gateway address plus the credential presented during the upgrade.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `ws://` or `wss://` URL of the gateway.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`. Empty means no header.
    pub access_token: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: access_token.into(),
        }
    }
}

// The token never shows up in logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Reconnection behavior after an established link is lost.
///
/// Mirrors the gateway client's `{enable, attempts, delay}` triple. `delay`
/// is in milliseconds on the wire and is waited before *every* attempt,
/// including the first one after the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// When `false`, a lost link is terminal.
    pub enable: bool,
    /// Maximum reconnect attempts before giving up.
    pub attempts: u32,
    /// Milliseconds to wait before each attempt.
    #[serde(rename = "delay")]
    pub delay_ms: u64,
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enable: false,
            attempts: 0,
            delay_ms: 0,
        }
    }

    /// The wait before each attempt.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Number of attempts this policy allows (0 when disabled).
    pub fn max_attempts(&self) -> u32 {
        if self.enable { self.attempts } else { 0 }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enable: true,
            attempts: 10,
            delay_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_policy_allows_no_attempts() {
        let policy = ReconnectPolicy {
            enable: false,
            attempts: 5,
            delay_ms: 10,
        };
        assert_eq!(policy.max_attempts(), 0);
        assert_eq!(ReconnectPolicy::disabled().max_attempts(), 0);
    }

    #[test]
    fn test_enabled_policy_uses_configured_attempts() {
        let policy = ReconnectPolicy {
            enable: true,
            attempts: 3,
            delay_ms: 250,
        };
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_endpoint_debug_redacts_token() {
        let endpoint = Endpoint::new("ws://127.0.0.1:3001", "hunter2");
        let printed = format!("{endpoint:?}");
        assert!(printed.contains("ws://127.0.0.1:3001"));
        assert!(!printed.contains("hunter2"));
    }
}
