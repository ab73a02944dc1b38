/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The gateway could not be reached or the upgrade failed.
    #[error("connect to {url} failed: {reason}")]
    ConnectFailed { url: String, reason: String },

    /// The gateway rejected the access token during the upgrade.
    #[error("gateway at {url} rejected the access token (HTTP {status})")]
    Unauthorized { url: String, status: u16 },

    /// The endpoint URL or token could not be turned into a request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` if retrying the same connect cannot succeed.
    ///
    /// A rejected token or a malformed endpoint stays rejected no matter
    /// how many times the reconnection policy retries.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::InvalidEndpoint(_))
    }
}

/// Why [`reconnect`](crate::reconnect) gave up.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} reconnect attempt(s): {source}")]
pub struct ReconnectError {
    /// Attempts actually made. Fewer than the policy allows when a
    /// permanent failure stopped the loop early, 0 when disabled.
    pub attempts: u32,
    /// The error of the last attempt.
    #[source]
    pub source: TransportError,
}
